//! # ai-stream-gateway
//!
//! 多厂商大模型流式网关：一个统一、可取消、带背压的流式接口。
//!
//! Provider Streaming Gateway - one normalized, cancellable, backpressure-aware event
//! stream over AI completion providers that each speak a different request shape,
//! streaming wire format and error vocabulary.
//!
//! ## Overview
//!
//! A caller hands the gateway a conversation and [`Settings`] naming a provider and
//! model. The gateway builds the provider-specific request, opens the upstream
//! stream, parses it incrementally and forwards [`UnifiedEvent`]s, while token usage
//! and cost are accumulated as a byproduct. Transient failures are retried as long as
//! nothing has reached the caller yet; everything else ends the stream with exactly
//! one `Failed` event carrying an [`ErrorKind`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_stream_gateway::{Dispatcher, Message, Settings, UnifiedEvent};
//!
//! #[tokio::main]
//! async fn main() -> ai_stream_gateway::Result<()> {
//!     let dispatcher = Dispatcher::builder().build()?;
//!
//!     let conversation = vec![
//!         Message::system("You are terse."),
//!         Message::user("Hello, how are you?"),
//!     ];
//!     let settings = Settings::new("anthropic", "claude-3-haiku-20240307").temperature(0.3);
//!
//!     let mut events = dispatcher.stream(&conversation, &settings);
//!     while let Some(event) = events.recv().await {
//!         if let UnifiedEvent::ContentDelta { text } = event {
//!             print!("{}", text);
//!         }
//!     }
//!     let (_, handle) = events.into_parts();
//!     let outcome = handle.finished().await;
//!     println!("\n{} attempt(s), usage {:?}", outcome.attempts, outcome.usage);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`dispatcher`] | Stream orchestration: validation, retry, cancellation, sink |
//! | [`drivers`] | Per-provider request building and response parsing |
//! | [`pipeline`] | Incremental byte framing (lines, SSE, NDJSON) |
//! | [`registry`] | Provider and model descriptors with rates |
//! | [`tokens`] | Token estimation, usage accumulation and cost |
//! | [`transport`] | Upstream abstraction and the reqwest implementation |
//! | [`types`] | Messages, settings and unified events |
//! | [`config`] | Timeouts, retry and channel settings |

pub mod config;
pub mod dispatcher;
pub mod drivers;
pub mod error_code;
pub mod pipeline;
pub mod registry;
pub mod tokens;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use config::{GatewayConfig, RetryConfig};
pub use dispatcher::{Dispatcher, DispatcherBuilder, EventStream, StreamHandle, StreamOutcome};
pub use error_code::ErrorKind;
pub use registry::{ApiStyle, ModelDescriptor, ProviderDescriptor, Registry};
pub use types::{Message, Role, Settings, UnifiedEvent, UsageSummary};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
