pub mod checker;
pub mod chromosome;
pub mod config;
pub mod controller;
pub mod fitness;
pub mod input;
pub mod island;
pub mod jobs;
pub mod models;
pub mod operators;
pub mod optimizer;
pub mod repair;
