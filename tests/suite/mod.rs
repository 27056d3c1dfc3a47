mod chat;
mod config;
mod fix;
mod gemini;
mod review;
