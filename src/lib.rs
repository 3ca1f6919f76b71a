pub mod client;
pub mod configuration;
pub mod db;
pub mod deploy;
pub mod forms;
pub mod helpers;
mod middleware;
pub mod models;
pub mod routes;
pub mod startup;
pub mod telemetry;
