//! Local LLM chat front end speaking the Ollama JSON API

pub mod cli;
pub mod config;
pub mod llm;
pub mod server;
pub mod session;
pub mod transcript;
