//! Natural-language shopping assistant.
//!
//! A hosted language model turns a free-text query into one of a handful of
//! storefront intents. The model only sees the query and a short list of known
//! events; whatever it returns is parsed strictly, and anything unusable
//! degrades to a plain search for the original query.

pub mod client;

pub use client::LlmIntentClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ticketmint_core::models::Event;

/// Events sent to the model as grounding context.
pub const MAX_CONTEXT_EVENTS: usize = 50;

/// Completion budget per query.
pub const MAX_TOKENS: u32 = 200;

/// Navigation targets the assistant may return.
pub const ALLOWED_HREFS: [&str; 3] = ["/", "/about", "/dashboard"];

/// Instructions sent with every query.
pub const SYSTEM_PROMPT: &str = r#"You are an intent parser for a Web3 ticketing app. Return ONLY a strict JSON object.
Allowed intents:
- { "type": "buy", "eventId": string|null, "quantity"?: number }
- { "type": "marketplace", "eventId": string|null }
- { "type": "navigate", "href": string }
- { "type": "search", "query": string }
- { "type": "list_ticket", "ticketId"?: string|null, "priceEth"?: number|null }

Rules:
- Prefer mapping event names to an eventId from the provided list. If uncertain, set eventId to null.
- For phrases like "show me second hand tickets" or "resale", use type "marketplace".
- For buying tickets like "buy 2 tickets for X", use type "buy" with quantity.
- If user asks to list their ticket, use "list_ticket" and include ticketId and priceEth when specified; otherwise leave them null.
- If the query is a general search, use type "search" with a cleaned query string.
- For navigate, constrain href to one of: "/" (events), "/about", "/dashboard" (my tickets). Map synonyms like "home", "events" -> "/"; "about us" -> "/about"; any phrase containing "ticket" or "dashboard" -> "/dashboard".
- Never include commentary; output valid JSON only."#;

/// Assistant failures.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// No API key configured
    #[error("Assistant not configured")]
    NotConfigured,

    /// HTTP request failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Response parsing failed
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),

    /// Rate limited - too many requests
    #[error("Rate limited - too many requests")]
    RateLimited,

    /// Unauthorized - invalid API key
    #[error("Unauthorized - invalid API key")]
    Unauthorized,

    /// API returned an error
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from API
        message: String,
    },
}

/// What the user asked for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    /// Buy tickets for an event
    #[serde(rename_all = "camelCase")]
    Buy {
        /// Matched event, if any
        #[serde(default)]
        event_id: Option<String>,
        /// Requested quantity
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quantity: Option<u32>,
    },
    /// Browse resale listings
    #[serde(rename_all = "camelCase")]
    Marketplace {
        /// Matched event, if any
        #[serde(default)]
        event_id: Option<String>,
    },
    /// Go to a page
    Navigate {
        /// One of [`ALLOWED_HREFS`]
        href: String,
    },
    /// Free-text search
    Search {
        /// Cleaned query
        query: String,
    },
    /// Put an owned ticket up for resale
    #[serde(rename_all = "camelCase")]
    ListTicket {
        /// Ticket, if named
        #[serde(default)]
        ticket_id: Option<String>,
        /// Asking price, if named
        #[serde(default)]
        price_eth: Option<f64>,
    },
}

impl Intent {
    /// Metric / log label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Buy { .. } => "buy",
            Self::Marketplace { .. } => "marketplace",
            Self::Navigate { .. } => "navigate",
            Self::Search { .. } => "search",
            Self::ListTicket { .. } => "list_ticket",
        }
    }

    /// Parses model output, falling back to a search for `query` when the
    /// output is not a usable intent.
    #[must_use]
    pub fn parse_or_search(raw: &str, query: &str) -> Self {
        let fallback = || Self::Search {
            query: query.to_string(),
        };
        match serde_json::from_str::<Self>(strip_code_fence(raw)) {
            Ok(Self::Navigate { href }) if !ALLOWED_HREFS.contains(&href.as_str()) => {
                tracing::debug!(%href, "Assistant returned a disallowed href");
                fallback()
            },
            Ok(intent) => intent,
            Err(e) => {
                tracing::debug!(error = %e, "Assistant output was not an intent");
                fallback()
            },
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|body| body.strip_suffix("```"))
        .map_or(trimmed, str::trim)
}

/// Event summary shown to the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct EventBrief<'a> {
    id: String,
    name: &'a str,
    date: String,
    location: &'a str,
}

/// `User query: ...` message with up to [`MAX_CONTEXT_EVENTS`] events.
#[must_use]
pub fn user_message(query: &str, events: &[Event]) -> String {
    let briefs: Vec<EventBrief<'_>> = events
        .iter()
        .take(MAX_CONTEXT_EVENTS)
        .map(|event| EventBrief {
            id: event.id.to_string(),
            name: &event.name,
            date: event.date.to_string(),
            location: &event.location,
        })
        .collect();
    let known = serde_json::to_string(&briefs).unwrap_or_else(|_| "[]".to_string());
    format!("User query: {query}\nKnown events: {known}")
}

/// A text completion model.
#[async_trait]
pub trait IntentModel: Send + Sync {
    /// Completes `user` under `system` instructions, returning raw text
    async fn complete(&self, system: &str, user: &str) -> Result<String, AssistantError>;
}

/// Stand-in used when no API key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledModel;

#[async_trait]
impl IntentModel for DisabledModel {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, AssistantError> {
        Err(AssistantError::NotConfigured)
    }
}

/// Interprets `query` against the known events.
///
/// # Errors
///
/// Propagates model failures; unusable output is not an error.
#[tracing::instrument(skip(model, events), fields(events = events.len()))]
pub async fn interpret(model: &dyn IntentModel, query: &str, events: &[Event]) -> Result<Intent, AssistantError> {
    let raw = model.complete(SYSTEM_PROMPT, &user_message(query, events)).await?;
    let intent = Intent::parse_or_search(&raw, query);
    crate::metrics::record_intent(intent.label());
    tracing::debug!(intent = intent.label(), "Query interpreted");
    Ok(intent)
}
