/// When an installed update takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// Restart into the new package right away.
    Immediate,
    /// Keep running the old package; the update applies on the next start.
    OnNextRestart,
    /// Apply when the host returns from the background after at least the
    /// configured minimum duration.
    OnNextResume,
}

impl InstallMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::OnNextRestart => "on-next-restart",
            Self::OnNextResume => "on-next-resume",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "immediate" => Some(Self::Immediate),
            "on-next-restart" => Some(Self::OnNextRestart),
            "on-next-resume" => Some(Self::OnNextResume),
            _ => None,
        }
    }
}
