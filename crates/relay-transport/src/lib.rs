//! Communication-method transports for Relay workers.
//!
//! Each provider is reached through exactly one method:
//!
//! - [`AcpSession`]: a long-lived agent process speaking newline-delimited
//!   JSON-RPC over stdio; accepts follow-up prompts.
//! - [`CliProcess`]: a one-shot subprocess receiving the prompt as its last
//!   argument.
//! - [`ApiCall`]: a single HTTP request with retry on transient failures.
//!
//! [`Transport`] wraps the three behind a uniform start / send / read / stop
//! surface. Output arrives on the [`TransportEvent`] receiver returned by
//! [`Transport::start`].
//!
//! # Example
//!
//! ```rust,no_run
//! use relay_core::{CommunicationMethod, ProviderDefinition};
//! use relay_transport::{StartOptions, Transport, TransportEvent};
//!
//! async fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = ProviderDefinition::new("qwen-cli", CommunicationMethod::Cli, "qwen", "qwen3-coder")
//!         .with_command("qwen", ["--yolo", "-p"]);
//!
//!     let (mut transport, mut events) =
//!         Transport::start(&provider, StartOptions::new("qwen3-coder", "Fix the failing test")).await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let TransportEvent::Stdout(line) = event {
//!             println!("{line}");
//!         }
//!     }
//!     let outcome = transport.finish().await;
//!     println!("success: {}", outcome.success);
//!     Ok(())
//! }
//! ```

mod acp;
mod api;
mod cli;
mod error;
mod process;
mod transport;
mod types;

pub use acp::AcpSession;
pub use api::{extract_text, ApiCall};
pub use cli::CliProcess;
pub use error::TransportError;
pub use transport::{ExitOutcome, StartOptions, Transport, TransportEvent};
pub use types::{AcpNotification, JsonRpcRequest};
