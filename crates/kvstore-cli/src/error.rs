/// Exit-code classification for `main` (§6): a clean shutdown is `0`, a bad
/// configuration (CLI flags, config file, or the derived peer address book)
/// is `1`, and a storage/runtime failure encountered while opening or
/// serving the node is `2`.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("node error: {0}")]
    Node(String),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) => 1,
            CliError::Node(_) => 2,
        }
    }
}
