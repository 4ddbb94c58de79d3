//! Declared system resources.
//!
//! A [`Resource`] is identified by `(type, key)`, rendered as `type[key]`
//! (e.g. `directory[/var/log/www]`), and carries a type-specific
//! [`ResourceSpec`] payload, the action to take, an optional [`Guard`] and
//! any number of deferred [`Notification`] edges.
//!
//! Resources are immutable once declared; the builder methods consume and
//! return `self` so a resource is fully described before it reaches the
//! registry.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Closed set of resource types the engine knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    User,
    Group,
    Directory,
    File,
    Template,
    Link,
    Service,
    Cron,
    Execute,
    DatabaseUser,
    Database,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceType::User => "user",
            ResourceType::Group => "group",
            ResourceType::Directory => "directory",
            ResourceType::File => "file",
            ResourceType::Template => "template",
            ResourceType::Link => "link",
            ResourceType::Service => "service",
            ResourceType::Cron => "cron",
            ResourceType::Execute => "execute",
            ResourceType::DatabaseUser => "database_user",
            ResourceType::Database => "database",
        };
        f.write_str(s)
    }
}

/// `(type, key)`: unique within one convergence run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceId {
    pub kind: ResourceType,
    pub key: String,
}

impl ResourceId {
    pub fn new(kind: ResourceType, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }

    pub fn service(name: impl Into<String>) -> Self {
        Self::new(ResourceType::Service, name)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.key)
    }
}

// ---------------------------------------------------------------------------
// Actions, guards, notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Declared only as a notification target.
    Nothing,
    Create,
    CreateIfMissing,
    Delete,
    Enable,
    Disable,
    Start,
    Stop,
    Restart,
    Reload,
    Run,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Nothing => "nothing",
            Action::Create => "create",
            Action::CreateIfMissing => "create_if_missing",
            Action::Delete => "delete",
            Action::Enable => "enable",
            Action::Disable => "disable",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::Reload => "reload",
            Action::Run => "run",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    /// Skip when the check exits 0.
    NotIf,
    /// Skip when the check exits non-zero.
    OnlyIf,
}

/// Shell predicate deciding whether the resource's action is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Guard {
    pub kind: GuardKind,
    pub command: String,
    /// Effective user the check runs as.
    pub user: Option<String>,
}

/// Deferred `action` on `target`, fired once at the end of the run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Notification {
    pub action: Action,
    pub target: ResourceId,
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: Option<u32>,
}

impl Ownership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owner and group both set to `name`.
    pub fn of(name: &str) -> Self {
        Self {
            owner: Some(name.to_string()),
            group: Some(name.to_string()),
            mode: None,
        }
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Inline(String),
    /// Copied from a static file on the host.
    Source(PathBuf),
}

/// Type-specific desired state. Opaque to the engine; interpreted by the
/// [`ResourceHandler`](crate::handler::ResourceHandler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSpec {
    User {
        gid: Option<String>,
        home: PathBuf,
        shell: String,
        manage_home: bool,
    },
    Group,
    Directory {
        ownership: Ownership,
        recursive: bool,
    },
    File {
        ownership: Ownership,
        /// `None` creates an empty file.
        content: Option<Content>,
    },
    Template {
        ownership: Ownership,
        template: String,
        rendered: String,
    },
    Link {
        to: PathBuf,
    },
    Service,
    Cron {
        /// The `cron.d` file the entry is written to.
        file: PathBuf,
        minute: String,
        hour: String,
        user: String,
        command: String,
    },
    Execute {
        command: String,
        user: Option<String>,
        cwd: Option<PathBuf>,
        env: BTreeMap<String, String>,
    },
    DatabaseUser {
        username: String,
        password: String,
    },
    Database {
        name: String,
        owner: String,
    },
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceType {
        match self {
            ResourceSpec::User { .. } => ResourceType::User,
            ResourceSpec::Group => ResourceType::Group,
            ResourceSpec::Directory { .. } => ResourceType::Directory,
            ResourceSpec::File { .. } => ResourceType::File,
            ResourceSpec::Template { .. } => ResourceType::Template,
            ResourceSpec::Link { .. } => ResourceType::Link,
            ResourceSpec::Service => ResourceType::Service,
            ResourceSpec::Cron { .. } => ResourceType::Cron,
            ResourceSpec::Execute { .. } => ResourceType::Execute,
            ResourceSpec::DatabaseUser { .. } => ResourceType::DatabaseUser,
            ResourceSpec::Database { .. } => ResourceType::Database,
        }
    }

    fn default_action(&self) -> Action {
        match self {
            ResourceSpec::Service => Action::Nothing,
            ResourceSpec::Execute { .. } => Action::Run,
            _ => Action::Create,
        }
    }
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: ResourceId,
    pub action: Action,
    pub spec: ResourceSpec,
    pub guard: Option<Guard>,
    pub notifies: Vec<Notification>,
}

impl Resource {
    /// A resource keyed by `key` with the type's default action.
    pub fn new(key: impl Into<String>, spec: ResourceSpec) -> Self {
        Self {
            id: ResourceId::new(spec.kind(), key),
            action: spec.default_action(),
            spec,
            guard: None,
            notifies: Vec::new(),
        }
    }

    pub fn directory(path: impl Into<PathBuf>, ownership: Ownership) -> Self {
        let path = path.into();
        Self::new(
            path.display().to_string(),
            ResourceSpec::Directory {
                ownership,
                recursive: false,
            },
        )
    }

    pub fn file(path: impl Into<PathBuf>, ownership: Ownership, content: Option<Content>) -> Self {
        let path = path.into();
        Self::new(
            path.display().to_string(),
            ResourceSpec::File { ownership, content },
        )
    }

    pub fn template(
        path: impl Into<PathBuf>,
        ownership: Ownership,
        template: &str,
        rendered: String,
    ) -> Self {
        let path = path.into();
        Self::new(
            path.display().to_string(),
            ResourceSpec::Template {
                ownership,
                template: template.to_string(),
                rendered,
            },
        )
    }

    pub fn link(path: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(path.display().to_string(), ResourceSpec::Link { to: to.into() })
    }

    pub fn service(name: impl Into<String>) -> Self {
        Self::new(name, ResourceSpec::Service)
    }

    pub fn execute(name: impl Into<String>, command: impl Into<String>, user: Option<&str>) -> Self {
        Self::new(
            name,
            ResourceSpec::Execute {
                command: command.into(),
                user: user.map(str::to_owned),
                cwd: None,
                env: BTreeMap::new(),
            },
        )
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    /// Only meaningful for directories.
    pub fn recursive(mut self) -> Self {
        if let ResourceSpec::Directory { recursive, .. } = &mut self.spec {
            *recursive = true;
        }
        self
    }

    pub fn not_if(mut self, command: impl Into<String>, user: Option<&str>) -> Self {
        self.guard = Some(Guard {
            kind: GuardKind::NotIf,
            command: command.into(),
            user: user.map(str::to_owned),
        });
        self
    }

    pub fn only_if(mut self, command: impl Into<String>, user: Option<&str>) -> Self {
        self.guard = Some(Guard {
            kind: GuardKind::OnlyIf,
            command: command.into(),
            user: user.map(str::to_owned),
        });
        self
    }

    pub fn notifies(mut self, action: Action, target: ResourceId) -> Self {
        self.notifies.push(Notification { action, target });
        self
    }

    /// Filesystem path for path-keyed resource types.
    pub fn path(&self) -> Option<PathBuf> {
        match self.id.kind {
            ResourceType::Directory
            | ResourceType::File
            | ResourceType::Template
            | ResourceType::Link => Some(PathBuf::from(&self.id.key)),
            ResourceType::Cron => match &self.spec {
                ResourceSpec::Cron { file, .. } => Some(file.clone()),
                _ => None,
            },
            _ => None,
        }
    }
}
