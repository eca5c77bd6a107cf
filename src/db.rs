// src/db.rs

pub mod store;
pub use store::{FlowJobStore, InteractionStore, LeadStore, ReminderStore, SettingsStore, Stores};

pub mod lead_repo;
pub use lead_repo::LeadRepository;
pub mod reminder_repo;
pub use reminder_repo::ReminderRepository;
pub mod flow_job_repo;
pub use flow_job_repo::FlowJobRepository;
pub mod settings_repo;
pub use settings_repo::SettingsRepository;
pub mod interaction_repo;
pub use interaction_repo::InteractionRepository;

pub mod memory;
pub use memory::MemoryStore;
