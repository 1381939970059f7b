pub mod types;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod seq_parse;
pub mod utils;
pub mod alignment;
pub mod collapse;
pub mod chimera;
pub mod sample;
pub mod population;
pub mod checkpoint;
pub mod collection;
pub mod rescue;
pub mod worker;
pub mod report;
pub mod decoder;
pub mod pipeline;
