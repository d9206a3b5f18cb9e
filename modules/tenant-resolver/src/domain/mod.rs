pub mod directory;
pub mod jobs;
pub mod key;
pub mod onboarding;
pub mod provisioning;
pub mod resolver;
