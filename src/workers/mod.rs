pub mod dispatcher;
pub mod pipeline;
pub mod progress;
pub mod single_flight;
pub mod transcoder;
