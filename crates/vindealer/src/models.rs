//! These models represent the objects passed around by the agent
//!
//! There are several different related formats we need to interact with:
//! - AI SDK ui messages, sent from the browser to the chat endpoint
//! - AI SDK ui message stream events, sent from the chat endpoint to the browser
//! - openai-compatible chat completion messages/tools, sent from the agent to the LLM
//! - NHTSA vPIC decode results, fetched by the VIN lookup tool
//!
//! We always immediately convert those data models into the internal structs using
//! to/from helpers, so the internal models are not an exact match to any of these formats.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
pub mod vehicle;
