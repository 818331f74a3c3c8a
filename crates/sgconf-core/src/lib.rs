//! sgconf-core: the client-side configuration engine
//!
//! A [`Config`] holds everything a client needs to talk to its hosts: the
//! tokens and certificates it owns, the clusters and contents they unlock,
//! and the keys it trusts. Changes arrive as [`ConfigInput`] patches and are
//! applied with [`update_config`], which counts what actually changed.

pub mod auth;
pub mod clean;
pub mod error;
pub mod export;
pub mod input;
pub mod load;
pub mod merge;
pub mod model;
pub mod references;
pub mod settings;
pub mod storage;
pub mod transport;
pub mod trust;
pub mod update;

pub use auth::{extract_private_keys, resolve_auth_info, AuthInfo, AuthQuery, KeyQuery};
pub use clean::clean_config;
pub use error::{ConfigError, ConfigResult};
pub use export::{export_config, export_config_to_file, EncryptedExport};
pub use input::{
    CertificateInput, ClusterInput, ConfigInput, ContentInput, HostInput, TokenInput,
    TrustedKeyInput,
};
pub use load::{load_config, load_config_from_text, load_config_from_url, ConfigSource, LoadOptions};
pub use merge::{Patch, PatchMap};
pub use model::{Certificate, Config, ConfigCluster, ConfigContent, Host, Token, TrustedKey};
pub use references::{
    find_certificate_candidates_for_references, unwrap_first_shared_key, CertificateCandidate,
    Node,
};
pub use settings::EngineSettings;
pub use storage::{load_config_sync, save_config, FileStorage, MemoryStorage, Storage, CONFIG_KEY};
pub use transport::{FetchRequest, FetchResponse, HttpTransport, Transport};
pub use trust::{prune_old_trusted_keys, PruneRequest};
pub use update::{is_update_empty, merge_updates, update_config};
