pub mod call;

pub use call::{
    InMemoryWebhookCallLog, NewWebhookCall, SeaOrmWebhookCallLog, SharedCallLog, WebhookCall,
    WebhookCallLog,
};
