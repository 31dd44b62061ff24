use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Cannot read config file {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] doctriage_core::ConfigError),

    #[error(transparent)]
    Load(#[from] doctriage_core::LoadError),

    #[error(transparent)]
    UnknownTool(#[from] doctriage_core::UnknownTool),
}
