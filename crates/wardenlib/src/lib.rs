pub mod broker;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod helpers;
pub mod job;
pub mod message;
pub mod pipeline;
pub mod plugin;
pub mod plugins;
pub mod registry;
pub mod scheduler;
pub mod supervisor;
pub mod target;
pub mod target_expand;
pub mod topic;
pub mod value;

pub use broker::{Broker, BrokerConnect, BrokerError, BrokerMessage, QoS, RumqttcBroker, SharedBroker};
pub use config::{ConfigError, EngineConfig, GlobalDefaults};
pub use helpers::{HelperFn, HelperInput, HelperOutcome, HelperRegistry};
pub use job::Job;
pub use message::Message;
pub use plugin::{Service, ServiceContext, ServiceError, ENGINE_VERSION};
pub use registry::{RegistryError, ServiceRegistry};
pub use supervisor::{Engine, EngineError};
pub use target::Target;
pub use value::ContextValue;
