//! Client for the proxy's line-oriented control protocol
//!
//! Only the two commands needed for rotation are spoken: `AUTHENTICATE`
//! and `SIGNAL NEWNYM`. Every reply must start with `250`.

use crate::config::ProxyConfig;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};

const SUCCESS_CODE: &str = "250";

/// Step of the control exchange, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStep {
    Connect,
    Authenticate,
    Signal,
}

impl fmt::Display for ControlStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Authenticate => "authenticate",
            Self::Signal => "signal",
        };
        f.write_str(name)
    }
}

/// Identity rotation failures
///
/// None of these are fatal to a crawl: the caller keeps the current
/// identity and may try again later.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Failed to connect to control endpoint {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Control endpoint timed out during {step}")]
    Timeout { step: ControlStep },

    #[error("Authentication rejected: {reply}")]
    AuthenticationRejected { reply: String },

    #[error("NEWNYM signal rejected: {reply}")]
    SignalRejected { reply: String },

    #[error("Control connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to build clients for the new identity: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("No control endpoint configured")]
    NotConfigured,
}

/// Connection parameters for the control endpoint
#[derive(Debug, Clone)]
pub struct ControlClient {
    address: String,
    password: String,
    connect_timeout: Duration,
    exchange_timeout: Duration,
}

impl ControlClient {
    pub fn new(
        address: impl Into<String>,
        password: impl Into<String>,
        connect_timeout: Duration,
        exchange_timeout: Duration,
    ) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            connect_timeout,
            exchange_timeout,
        }
    }

    /// `None` when no control address is configured
    pub fn from_config(config: &ProxyConfig) -> Option<Self> {
        config.control_address.as_ref().map(|address| {
            Self::new(
                address.clone(),
                config.control_password.clone(),
                config.connect_timeout(),
                config.exchange_timeout(),
            )
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Authenticates and asks the proxy for a new circuit
    ///
    /// The dial has its own timeout; each reply must arrive within the
    /// exchange timeout, and the whole exchange never outlives it either.
    pub async fn signal_newnym(&self) -> Result<(), ControlError> {
        let stream = match timeout(self.connect_timeout, TcpStream::connect(&self.address)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ControlError::Dial {
                    address: self.address.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(ControlError::Timeout {
                    step: ControlStep::Connect,
                })
            }
        };

        let deadline = Instant::now() + self.exchange_timeout;
        let (read, write) = stream.into_split();
        let mut session = Session {
            reader: BufReader::new(read),
            writer: write,
            deadline,
            step_timeout: self.exchange_timeout,
        };

        let reply = session
            .command(&self.authenticate_command(), ControlStep::Authenticate)
            .await?;
        if !reply.starts_with(SUCCESS_CODE) {
            return Err(ControlError::AuthenticationRejected { reply });
        }

        let reply = session
            .command("SIGNAL NEWNYM\r\n", ControlStep::Signal)
            .await?;
        if !reply.starts_with(SUCCESS_CODE) {
            return Err(ControlError::SignalRejected { reply });
        }

        tracing::debug!("Control endpoint {} granted a new identity", self.address);
        Ok(())
    }

    fn authenticate_command(&self) -> String {
        if self.password.is_empty() {
            "AUTHENTICATE\r\n".to_string()
        } else {
            format!("AUTHENTICATE \"{}\"\r\n", escape_quoted(&self.password))
        }
    }
}

/// One open control connection with its exchange deadline
struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    deadline: Instant,
    step_timeout: Duration,
}

impl Session {
    /// Sends one command line and reads the first reply line
    async fn command(&mut self, line: &str, step: ControlStep) -> Result<String, ControlError> {
        let step_deadline = (Instant::now() + self.step_timeout).min(self.deadline);
        let exchange = async {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.flush().await?;

            let mut reply = String::new();
            self.reader.read_line(&mut reply).await?;
            Ok::<_, std::io::Error>(reply.trim_end().to_string())
        };

        match timeout_at(step_deadline, exchange).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ControlError::Timeout { step }),
        }
    }
}

/// Escapes a value for a quoted control-protocol string
fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
