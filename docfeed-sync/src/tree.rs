use std::fmt;
use std::path::PathBuf;

use docfeed_core::{Entry, ROOT_FOLDER_ID};
use thiserror::Error;
use time::OffsetDateTime;

pub const FOLDER_KIND: &str = "folder";
pub const FILE_KIND: &str = "file";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0} is not part of this tree")]
    UnknownNode(NodeId),
    #[error("{0} is not a folder")]
    NotAFolder(String),
}

/// Handle into a `ResourceTree`. Only meaningful for the tree that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    LocalNew,
    LocalChanged,
    LocalDeleted,
    RemoteNew,
    RemoteChanged,
    RemoteDeleted,
    BothChanged,
    /// Local and remote agree.
    Sync,
    Unknown,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::LocalNew => "local_new",
            State::LocalChanged => "local_changed",
            State::LocalDeleted => "local_deleted",
            State::RemoteNew => "remote_new",
            State::RemoteChanged => "remote_changed",
            State::RemoteDeleted => "remote_deleted",
            State::BothChanged => "both_changed",
            State::Sync => "sync",
            State::Unknown => "unknown",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    /// `folder`, or the file kind the service reports (`file`, `document`, ...).
    pub kind: String,
    pub path: PathBuf,
    pub etag: String,
    /// Empty until the server has assigned one.
    pub resource_id: String,
    pub self_href: String,
    pub content_src: String,
    /// Remote modification time; `None` when the server never reported one.
    pub mtime: Option<OffsetDateTime>,
    pub editable: bool,
    pub state: State,
    parent: Option<NodeId>,
}

impl Resource {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            path: PathBuf::new(),
            etag: String::new(),
            resource_id: String::new(),
            self_href: String::new(),
            content_src: String::new(),
            mtime: None,
            editable: true,
            state: State::Unknown,
            parent: None,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FILE_KIND)
    }

    pub fn folder(name: impl Into<String>) -> Self {
        Self::new(name, FOLDER_KIND)
    }

    pub fn with_state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub fn with_remote(
        mut self,
        resource_id: impl Into<String>,
        etag: impl Into<String>,
        self_href: impl Into<String>,
    ) -> Self {
        self.resource_id = resource_id.into();
        self.etag = etag.into();
        self.self_href = self_href.into();
        self
    }

    pub fn is_folder(&self) -> bool {
        self.kind == FOLDER_KIND
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Copies the server-assigned identity from `entry`. Fields the server
    /// left empty keep their local value.
    pub fn assign_ids(&mut self, entry: &Entry) {
        assign_non_empty(&mut self.resource_id, &entry.resource_id);
        assign_non_empty(&mut self.self_href, &entry.self_href);
        assign_non_empty(&mut self.content_src, &entry.content_src);
        assign_non_empty(&mut self.etag, &entry.etag);
    }

    pub fn assign_mtime(&mut self, mtime: Option<OffsetDateTime>) {
        self.mtime = mtime;
    }
}

fn assign_non_empty(target: &mut String, value: &str) {
    if !value.is_empty() {
        target.clear();
        target.push_str(value);
    }
}

/// Arena of resources. Node 0 is always the root folder.
#[derive(Debug, Clone)]
pub struct ResourceTree {
    nodes: Vec<Resource>,
}

impl ResourceTree {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        let mut root = Resource::folder(".")
            .with_state(State::Sync)
            .with_remote(ROOT_FOLDER_ID, "", "");
        root.path = root_path.into();
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root()
    }

    /// Adds `resource` below `parent`; its local path becomes the parent's
    /// path joined with its name.
    pub fn insert(&mut self, parent: NodeId, mut resource: Resource) -> Result<NodeId, TreeError> {
        let parent_node = self.get(parent).ok_or(TreeError::UnknownNode(parent))?;
        if !parent_node.is_folder() {
            return Err(TreeError::NotAFolder(parent_node.name.clone()));
        }
        resource.path = parent_node.path.join(&resource.name);
        resource.parent = Some(parent);
        self.nodes.push(resource);
        Ok(NodeId(self.nodes.len() - 1))
    }

    pub fn get(&self, id: NodeId) -> Option<&Resource> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Resource> {
        self.nodes.get_mut(id.0)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(Resource::parent)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
