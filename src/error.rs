use std::path::PathBuf;

/// Errors raised while driving the external defragmentation utility
#[derive(Debug, thiserror::Error)]
pub enum DefragError {
    #[error("failed to launch {program}: {source}")]
    SubprocessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("defrag utility exited with {}: {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    SubprocessReported { code: Option<i32>, stderr: String },

    #[error("defrag utility did not finish within {seconds}s")]
    Timeout { seconds: u64 },

    /// Raw `Error: ...` response from the utility
    #[error("{0}")]
    ToolReported(String),

    #[error("worklist not found: {}", .0.display())]
    WorklistNotFound(PathBuf),

    #[error("worklist I/O failed for {}: {source}", .path.display())]
    WorklistIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("interrupted by operator")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, DefragError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_failure_message() {
        let err = DefragError::SubprocessReported { code: Some(2), stderr: "busy".to_string() };
        assert_eq!(err.to_string(), "defrag utility exited with 2: busy");

        let err = DefragError::SubprocessReported { code: None, stderr: String::new() };
        assert!(err.to_string().contains("signal"));
    }

    #[test]
    fn test_tool_reported_keeps_raw_text() {
        let err = DefragError::ToolReported("Error: permission denied".to_string());
        assert_eq!(err.to_string(), "Error: permission denied");
    }
}
