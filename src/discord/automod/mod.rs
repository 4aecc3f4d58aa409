// Automod glue between serenity and the core engine.

pub mod automod_handler;
pub mod serenity_executor;
