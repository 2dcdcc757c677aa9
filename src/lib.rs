pub mod agent;
pub mod border;
pub mod channel;
pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod food;
pub mod game;
pub mod log;
pub mod render;
pub mod session;
pub mod snake;
pub mod state;
pub mod train;
pub mod utils;
pub mod web;
