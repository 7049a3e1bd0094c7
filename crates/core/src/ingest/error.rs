use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Connect failure, timeout, or non-success HTTP status.
    Network,
    /// Response received but not in the expected shape.
    Parse,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::Network => "network",
            FetchErrorKind::Parse => "parse",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub stage: &'static str,
    pub detail: String,
}

impl FetchError {
    pub fn network(stage: &'static str, detail: impl fmt::Display) -> Self {
        Self {
            kind: FetchErrorKind::Network,
            stage,
            detail: detail.to_string(),
        }
    }

    pub fn parse(stage: &'static str, detail: impl fmt::Display) -> Self {
        Self {
            kind: FetchErrorKind::Parse,
            stage,
            detail: detail.to_string(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetch error (kind={}, stage={}): {}",
            self.kind.as_str(),
            self.stage,
            self.detail
        )
    }
}

impl std::error::Error for FetchError {}
