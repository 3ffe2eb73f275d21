use std::io::Write;
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use super::{AnalysisRequest, RawAnalysis, SeoScorer};
use crate::config::ScorerConfig;
use crate::error::{AutoblogError, Result};

/// Scorer backed by an external script (a Node.js wrapper around the Yoast
/// analysis library by default).
///
/// Invokes `<program> <script>` once per analysis, writing the request JSON
/// to stdin and parsing the result groups from stdout.
pub struct NodeScorer {
    program: String,
    script: String,
}

impl NodeScorer {
    pub fn new(config: &ScorerConfig) -> Self {
        info!(program = %config.program, script = %config.script, "scorer initialized");
        Self {
            program: config.program.clone(),
            script: config.script.clone(),
        }
    }
}

impl SeoScorer for NodeScorer {
    fn name(&self) -> &str {
        "node"
    }

    fn analyze(&self, request: &AnalysisRequest) -> Result<RawAnalysis> {
        let input = serde_json::to_vec(request)?;

        let mut cmd = Command::new(&self.program);
        if !self.script.is_empty() {
            cmd.arg(&self.script);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(program = %self.program, text_len = request.text.len(), "invoking scorer");

        let mut child = cmd.spawn().map_err(|e| {
            AutoblogError::Scorer(format!("failed to spawn scorer ({}): {e}", self.program))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&input) {
                drop(stdin);
                let _ = child.kill();
                let status = child.wait();
                warn!(error = %e, status = ?status, "scorer stopped reading its input");
                return Err(AutoblogError::Scorer(format!(
                    "failed to write to scorer stdin: {e}"
                )));
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| AutoblogError::Scorer(format!("scorer failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                exit_code = ?output.status.code(),
                stderr = %stderr,
                "scorer exited with error"
            );
            return Err(AutoblogError::Scorer(format!(
                "scorer exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| AutoblogError::Scorer(format!("unparsable scorer output: {e}")))
    }
}
