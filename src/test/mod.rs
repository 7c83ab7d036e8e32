pub mod utils;

mod members;
mod sessions;
