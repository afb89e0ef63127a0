// src/engine/mod.rs

//! Pure quiz logic: time, progression, join policy, lifecycle, rankings.

pub mod aggregation;
pub mod clock;
pub mod join_policy;
pub mod lifecycle;
pub mod progression;
