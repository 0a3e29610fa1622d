mod config;
mod scenarios;
mod versions;
