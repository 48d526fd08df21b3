//! Lineplate core library: LINE webhook gateway, Thai licence plate reading with Gemini,
//! per-source chat sessions, and optional plate persistence. Used by the CLI.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod handlers;
pub mod init;
pub mod llm;
pub mod media;
pub mod plate;
pub mod session;
pub mod storage;
