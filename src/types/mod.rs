//! 类型系统模块：网关对外暴露的核心数据类型。
//!
//! # Types Module
//!
//! Provider-agnostic types that cross the gateway boundary.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Chat message with role and text content |
//! | [`Role`] | Message role (user, assistant, system, tool) |
//! | [`Settings`] | Provider/model selection plus sampling parameters |
//! | [`UnifiedEvent`] | The only event shape a caller ever sees |
//! | [`UsageSummary`] | Final token and cost totals for one message |
//!
//! ## Example
//!
//! ```rust
//! use ai_stream_gateway::types::{Message, Settings};
//!
//! let conversation = vec![
//!     Message::system("You are a helpful assistant"),
//!     Message::user("What's the weather?"),
//! ];
//! let settings = Settings::new("openai", "gpt-4o-mini").temperature(0.2);
//! assert!(settings.validate().is_ok());
//! assert_eq!(conversation.len(), 2);
//! ```

pub mod events;
pub mod message;
pub mod settings;

pub use events::{UnifiedEvent, UsageSummary};
pub use message::{Conversation, Message, Role};
pub use settings::Settings;
