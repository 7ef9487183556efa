//! # SQS Dispatcher
//!
//! An asynchronous AWS SQS subscriber that classifies every message by its
//! `messageType` tag, decodes it into one of a closed set of typed requests and
//! routes it to the matching handler operation.
//!
//! ## Features
//!
//! - A generic receive pump ([`receiver::MessageSubscriber`]) driven by a callback value
//! - Exhaustive type-tag routing over [`requests::RequestKind`]
//! - Explicit message resolution: the callback returns a [`message::Resolution`]
//!   and the pump completes or dead-letters the delivery
//! - Dead-lettering with a machine-readable reason and a human-readable description
//! - Concurrent processing of each received batch
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use rs_sqs_dispatcher::{
//!     client::create_sqs_client,
//!     dispatcher::outbound_subscriber,
//!     errors::HandlerError,
//!     handler::OutboundMessageHandler,
//!     receiver::SubscriberConfig,
//!     requests::{FirstRequest, SecondRequest},
//!     session::SqsSession,
//! };
//!
//! struct PrintingHandler;
//!
//! #[async_trait]
//! impl OutboundMessageHandler for PrintingHandler {
//!     async fn handle_first(&self, request: FirstRequest) -> Result<(), HandlerError> {
//!         println!("first: {}", request.field);
//!         Ok(())
//!     }
//!
//!     async fn handle_second(&self, request: SecondRequest) -> Result<(), HandlerError> {
//!         println!("second: {}", request.reference);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SubscriberConfig::from_env()?;
//!     let client = create_sqs_client(&config).await;
//!     let session = SqsSession::new(client, &config.queue_name, &config.dead_letter_queue_name);
//!
//!     let subscription = outbound_subscriber(session, Arc::new(PrintingHandler), config)
//!         .start()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     subscription.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod dispatcher;
pub mod errors;
pub mod handler;
pub mod logging;
pub mod message;
pub mod receiver;
pub mod requests;
pub mod session;
