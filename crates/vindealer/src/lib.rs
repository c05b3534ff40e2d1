pub mod agent;
pub mod errors;
pub mod models;
pub mod nhtsa;
pub mod prompt_template;
pub mod providers;
pub mod systems;
