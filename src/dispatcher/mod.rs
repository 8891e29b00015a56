//! 调度器模块：提供统一、可取消、带背压的流式调用入口。
//!
//! # Dispatcher
//!
//! Runs one stream per call: validates the request, opens the upstream through the
//! provider's driver, parses the response and forwards [`UnifiedEvent`]s to the
//! caller while usage and cost are tracked.
//!
//! ## Guarantees
//!
//! - Exactly one terminal event (`Done` or `Failed`) per stream, nothing after it.
//! - Content deltas arrive in upstream order; concatenated they equal the message.
//! - Transient failures (network, 5xx, idle stall) are retried with exponential
//!   backoff, but only while no content has reached the caller in that attempt.
//! - Rate limits are never retried internally; `Failed.retryable` is `true` and
//!   `retry_after_ms` carries the provider's hint when it sent one.
//! - Cancellation drops the upstream connection and ends with `Failed { Cancelled }`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ai_stream_gateway::{Dispatcher, Message, Settings, UnifiedEvent};
//!
//! # async fn demo() -> ai_stream_gateway::Result<()> {
//! let dispatcher = Dispatcher::builder().build()?;
//! let conversation = vec![Message::user("Say hello")];
//! let mut events = dispatcher.stream(&conversation, &Settings::new("openai", "gpt-4o-mini"));
//! while let Some(event) = events.recv().await {
//!     match event {
//!         UnifiedEvent::ContentDelta { text } => print!("{}", text),
//!         UnifiedEvent::Done { usage, .. } => println!("\n{} tokens", usage.total_tokens),
//!         UnifiedEvent::Failed { kind, message, .. } => eprintln!("{}: {}", kind, message),
//!         UnifiedEvent::Usage { .. } => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`UnifiedEvent`]: crate::types::UnifiedEvent

mod builder;
mod core;
mod error_classification;
mod execution;
mod policy;
mod types;

pub use builder::DispatcherBuilder;
pub use self::core::{Dispatcher, PreparedRequest};
pub use types::{EventStream, StreamHandle, StreamOutcome};
