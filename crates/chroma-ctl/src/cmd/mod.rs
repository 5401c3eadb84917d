//! CLI command modules.

pub mod interactive;
pub mod send;

/// Where the daemon listens.
#[derive(Debug, Clone)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Server {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
