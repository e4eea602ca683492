//! # lorechat - streaming client for the lorechat writing backend
//!
//! The backend generates chat and story replies and streams them back over
//! Server-Sent Events. This crate is the client side of that contract: it
//! posts a [`StreamRequest`](model::StreamRequest) to `{base}/chat/stream`,
//! decodes the SSE body incrementally, and hands out typed events.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Byte-exact incremental decoding: any fragmentation of the body yields the same events
//! - Two consumption styles: callbacks with a cancel handle, or a lazy `Stream`
//! - Cooperative cancellation that never reports an error
//! - An explicit [`Composer`](composer::Composer) context object for conversation state
//!
//! ## Architecture
//!
//! - [`sse`]: bytes to UTF-8 text to `\n\n`-delimited frames
//! - [`stream`]: frames to [`StreamEvent`]s, as an [`EventStream`](stream::EventStream)
//! - [`client`]: the HTTP side ([`StreamClient`]) and [`ClientError`]
//! - [`callbacks`]: the callback driver and [`StreamHandle`]
//! - [`composer`]: conversation state driven by events
//! - [`config`], [`options`], [`http`]: configuration and transport setup
//!
//! ## Example
//! ```no_run
//! use futures::StreamExt;
//! use lorechat::client::StreamClient;
//! use lorechat::model::{StreamEvent, StreamRequest};
//! use lorechat::options::TransportOptions;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = StreamClient::new(
//!         TransportOptions::new("http://localhost:8080/api").with_session_cookie("session=abc"),
//!     )?;
//!
//!     let request = StreamRequest::new("gpt-4o", "Describe the harbour at dawn.")
//!         .with_lore(vec![4, 8]);
//!
//!     let mut events = client.open(&request).await?;
//!     while let Some(event) = events.next().await {
//!         match event? {
//!             StreamEvent::Chunk(delta) => print!("{delta}"),
//!             StreamEvent::Done(done) => println!("\n(chat {:?})", done.chat_id),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod callbacks;
pub mod client;
pub mod composer;
pub mod config;
pub mod http;
pub mod model;
pub mod options;
pub mod sse;
pub mod stream;

// Re-exports for convenience
pub use callbacks::{StreamCallbacks, StreamHandle};
pub use client::{ChatStreamer, ClientError, StreamClient};
pub use model::{ChatDone, StreamEvent, StreamRequest};
