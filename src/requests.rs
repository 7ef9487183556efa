//! The closed set of requests accepted on the outbound queue.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirstRequest {
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondRequest {
    pub reference: String,

    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

/// A decoded request, ready to be routed to its handler operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundRequest {
    First(FirstRequest),
    Second(SecondRequest),
}

/// Discriminator of the request variants, matched against the `messageType` tag.
///
/// Adding a variant here forces every `match` over it, including the handler
/// routing in the dispatcher, to be extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    First,
    Second,
}

impl RequestKind {
    pub const ALL: [RequestKind; 2] = [RequestKind::First, RequestKind::Second];

    /// The type tag producers put in `messageType` for this variant.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            RequestKind::First => "FirstRequest",
            RequestKind::Second => "SecondRequest",
        }
    }

    /// Case-sensitive lookup of a type tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.canonical_name() == tag)
    }

    /// Deserializes JSON text into the payload of this variant.
    pub fn decode(&self, content: &str) -> Result<OutboundRequest, serde_json::Error> {
        Ok(match self {
            RequestKind::First => OutboundRequest::First(serde_json::from_str(content)?),
            RequestKind::Second => OutboundRequest::Second(serde_json::from_str(content)?),
        })
    }
}

impl OutboundRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            OutboundRequest::First(_) => RequestKind::First,
            OutboundRequest::Second(_) => RequestKind::Second,
        }
    }
}
