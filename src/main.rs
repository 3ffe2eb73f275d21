mod article;
mod config;
mod error;
mod images;
mod llm;
mod optimize;
mod research;
mod retry;
mod seo;
#[cfg(test)]
mod test_support;
mod wordpress;
mod workflow;

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};

use crate::config::Config;
use crate::workflow::{RunOptions, Workflow};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file (if present) before anything reads env vars
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--default-config") {
        print!("{}", Config::default_config_contents());
        return ExitCode::SUCCESS;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = flag_value(&args, "--config").map(PathBuf::from);
    let mut config = match Config::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(keyword) = flag_value(&args, "--keyword") {
        config.keyword = keyword.to_string();
    }

    let options = RunOptions {
        publish: !args.iter().any(|a| a == "--no-publish"),
        optimize: !args.iter().any(|a| a == "--no-optimize"),
    };

    info!(
        keyword = %config.keyword,
        model = %config.llm.model,
        publish = options.publish,
        optimize = options.optimize,
        "autoblog starting"
    );

    match Workflow::new(config, options).run().await {
        Ok(report) => {
            info!(
                keyword = %report.keyword,
                generated = report.generated,
                loop_state = ?report.loop_state,
                iterations = report.iterations,
                remaining_findings = report.remaining_findings,
                post_id = ?report.post.as_ref().map(|p| p.id),
                link = %report.post.as_ref().map(|p| p.link.as_str()).unwrap_or(""),
                "run complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "run failed, nothing was published");
            ExitCode::FAILURE
        }
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn print_usage() {
    println!(
        "autoblog — generate, SEO-optimize and publish a blog article for one keyword

USAGE:
    autoblog [OPTIONS]

OPTIONS:
    --config <PATH>     Path to config file (default: ~/.config/autoblog/config.toml)
    --default-config    Print default config to stdout and exit
    --keyword <KW>      Primary keyword (overrides KEYPHRASE and the config file)
    --no-optimize       Skip the score/revise loop
    --no-publish        Keep the article on disk; do not upload images or create a post
    -h, --help          Print this help message

ENVIRONMENT:
    OPENAI_API_KEY        OpenAI API key (generation and images)
    OPENAI_MODEL          Model name (default: gpt-4.1)
    LLM_BACKEND           \"openai\" (default)
    SITE_URL              WordPress site URL
    WP_API_USER           WordPress user
    WP_API_PASS           WordPress application password
    GOOGLE_API_KEY        Google Custom Search API key (research)
    GOOGLE_CSE_ID         Google Custom Search engine id (research)
    KEYPHRASE             Primary keyword
    RELATED_ARTICLE_IDS   Comma-separated post ids or slugs offered as internal links
    RUST_LOG              Log filter (default: info)

ARTIFACTS:
    <output_dir>/<keyword>.json   Structured record, including the conversation id
    <output_dir>/<keyword>.html   Article document

    An existing pair is resumed instead of generating a new article."
    );
}
