// src/handlers/mod.rs

pub mod auth;
pub mod quizzes;
pub mod results;
pub mod stream;
pub mod time;
