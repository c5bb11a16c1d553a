use std::fs::{self, File};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use docfeed_core::header::{
    ACCEPT, CONTENT_TYPE, EXPECT, HeaderMap, HeaderName, HeaderValue, IF_MATCH,
};
use docfeed_core::{
    Agent, Body, Entry, FeedUris, METADATA_CONTENT_TYPE, check_well_formed, metadata_document,
};
use filetime::FileTime;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::{Disposition, Phase, PreconditionError, SyncError, Transient, is_success};
use crate::retry::RetryPolicy;
use crate::tree::{FOLDER_KIND, NodeId, Resource, ResourceTree, State};

const UPLOAD_CONTENT_TYPE: &str = "application/octet-stream";

type Sleeper = Box<dyn FnMut(Duration) + Send>;

enum UploadState {
    Attempting,
    RetryScheduled(Transient),
    Succeeded(Box<Entry>),
}

/// Drives the per-resource exchanges with the document service. Every
/// operation works on one node of a caller-owned `ResourceTree`.
pub struct Syncer<A> {
    agent: A,
    uris: FeedUris,
    retry: RetryPolicy,
    sleeper: Sleeper,
}

impl<A: Agent> Syncer<A> {
    pub fn new(agent: A) -> Self {
        Self {
            agent,
            uris: FeedUris::default(),
            retry: RetryPolicy::default(),
            sleeper: Box::new(std::thread::sleep),
        }
    }

    pub fn from_config(agent: A, config: &SyncConfig) -> Self {
        Self::new(agent)
            .with_uris(config.uris.clone())
            .with_retry_policy(config.retry)
    }

    pub fn with_uris(mut self, uris: FeedUris) -> Self {
        self.uris = uris;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the pause taken between upload attempts.
    pub fn with_sleeper(mut self, sleeper: impl FnMut(Duration) + Send + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn into_agent(self) -> A {
        self.agent
    }

    /// Deletes the remote copy of `node`. Never fails: errors are logged and
    /// the deletion is treated as skipped.
    pub fn delete_remote(&mut self, tree: &mut ResourceTree, node: NodeId) {
        let mut reply = Vec::new();
        if let Err(err) = self.try_delete_remote(tree, node, &mut reply) {
            let name = tree.get(node).map(|res| res.name.as_str()).unwrap_or("?");
            warn!(
                name,
                error = %err,
                response = %String::from_utf8_lossy(&reply),
                "remote delete failed"
            );
        }
    }

    fn try_delete_remote(
        &mut self,
        tree: &mut ResourceTree,
        node: NodeId,
        reply: &mut Vec<u8>,
    ) -> Result<(), SyncError> {
        let resource = lookup(tree, node)?;
        if resource.self_href.is_empty() {
            return Err(PreconditionError::MissingSelfHref(resource.name.clone()).into());
        }
        let headers = if_match_headers(&resource.etag)?;

        // The service rejects deletes of entries it has not served recently,
        // so fetch the entry first.
        let mut refreshed = Vec::new();
        let status = self
            .agent
            .get(&resource.self_href, &mut refreshed, &headers)
            .map_err(|err| SyncError::agent(Phase::Metadata, err))?;
        ensure_success(Phase::Metadata, status, &refreshed)?;
        let entry =
            Entry::parse(&refreshed).map_err(|err| SyncError::document(Phase::Metadata, err))?;
        let resource = lookup_mut(tree, node)?;
        resource.assign_ids(&entry);

        let status = self
            .agent
            .custom("DELETE", &resource.self_href, reply, &headers)?;
        ensure_success(Phase::Metadata, status, reply.as_slice())?;
        debug!(name = %resource.name, "remote entry deleted");
        Ok(())
    }

    /// Fetches the content of `node` into `dest` and stamps it with the
    /// remote modification time when one is known. No checksum is verified.
    pub fn download(
        &mut self,
        tree: &ResourceTree,
        node: NodeId,
        dest: &Path,
    ) -> Result<(), SyncError> {
        let resource = lookup(tree, node)?;
        if resource.content_src.is_empty() {
            return Err(PreconditionError::MissingContentSource(resource.name.clone()).into());
        }

        let partial = partial_path(dest);
        let status = match self.fetch_to(&resource.content_src, &partial) {
            Ok(status) if is_success(status) => status,
            Ok(status) => {
                let body = fs::read_to_string(&partial).unwrap_or_default();
                let _ = fs::remove_file(&partial);
                return Err(SyncError::Status {
                    phase: Phase::Content,
                    status,
                    body,
                });
            }
            Err(err) => {
                let _ = fs::remove_file(&partial);
                return Err(err);
            }
        };
        fs::rename(&partial, dest)?;
        debug!(name = %resource.name, status, path = %dest.display(), "downloaded");

        match resource.mtime {
            Some(mtime) => {
                let stamp = FileTime::from_system_time(SystemTime::from(mtime));
                filetime::set_file_mtime(dest, stamp)?;
            }
            None => warn!(
                path = %dest.display(),
                "encountered zero date time after downloading"
            ),
        }
        Ok(())
    }

    fn fetch_to(&mut self, url: &str, target: &Path) -> Result<u16, SyncError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(target)?;
        let status = self.agent.get(url, &mut file, &HeaderMap::new())?;
        file.sync_all()?;
        Ok(status)
    }

    /// Uploads new content for an existing remote file. Returns `Ok(false)`
    /// without touching the network when the file is read-only.
    pub fn edit_content(
        &mut self,
        tree: &mut ResourceTree,
        node: NodeId,
        new_revision: bool,
    ) -> Result<bool, SyncError> {
        check_parent(tree, node)?;
        let resource = lookup(tree, node)?;
        if !resource.editable {
            warn!(
                name = %resource.name,
                state = %resource.state,
                "cannot upload: file read-only"
            );
            return Ok(false);
        }

        let link = self.uris.edit_session(&resource.resource_id, new_revision);
        self.upload(tree, node, &link, false)
    }

    /// Creates `node` remotely: folders with a single metadata POST, files
    /// through the upload handshake.
    pub fn create(&mut self, tree: &mut ResourceTree, node: NodeId) -> Result<bool, SyncError> {
        let parent_id = check_parent(tree, node)?;
        let parent = lookup(tree, parent_id)?;
        let resource = lookup(tree, node)?;

        if resource.is_folder() {
            let nested =
                (!tree.is_root(parent_id)).then(|| self.agent.escape(&parent.resource_id));
            let uri = self.uris.folder_feed(nested.as_deref());
            let meta = metadata_document(FOLDER_KIND, &resource.name);

            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(METADATA_CONTENT_TYPE));
            let mut reply = Vec::new();
            let status = self
                .agent
                .post(&uri, meta.as_bytes(), &mut reply, &headers)
                .map_err(|err| SyncError::agent(Phase::Metadata, err))?;
            ensure_success(Phase::Metadata, status, &reply)?;
            let entry =
                Entry::parse(&reply).map_err(|err| SyncError::document(Phase::Metadata, err))?;
            lookup_mut(tree, node)?.assign_ids(&entry);
            debug!(%uri, "folder created");
            Ok(true)
        } else if parent.editable {
            let link = self.uris.create_session(&parent.resource_id);
            self.upload(tree, node, &link, true)
        } else {
            warn!(
                name = %resource.name,
                parent = %parent.name,
                "parent folder is not editable: cannot upload"
            );
            Ok(false)
        }
    }

    /// Runs the resumable upload handshake against `link`: the metadata
    /// document goes out first (POST when `post`, PUT otherwise), then the
    /// file content goes to the session URI the server hands back. Malformed
    /// replies and 410/412 on the content leg restart the whole handshake.
    pub fn upload(
        &mut self,
        tree: &mut ResourceTree,
        node: NodeId,
        link: &str,
        post: bool,
    ) -> Result<bool, SyncError> {
        check_parent(tree, node)?;
        let resource = lookup(tree, node)?;
        let mut file = File::open(&resource.path)?;
        let headers = metadata_headers(file.metadata()?.len(), &resource.etag)?;
        let meta = metadata_document(&resource.kind, &resource.name);
        let name = resource.name.clone();

        let mut retries = 0u32;
        let mut state = UploadState::Attempting;
        let entry = loop {
            state = match state {
                UploadState::Attempting => {
                    match self.exchange(link, post, &meta, &headers, &mut file) {
                        Ok(entry) => UploadState::Succeeded(Box::new(entry)),
                        Err(err) => match err.disposition() {
                            Disposition::Transient(cause) => {
                                warn!(%name, %cause, "retrying whole upload");
                                UploadState::RetryScheduled(cause)
                            }
                            Disposition::Fatal => return Err(err),
                        },
                    }
                }
                UploadState::RetryScheduled(cause) => {
                    retries += 1;
                    if !self.retry.permits(retries) {
                        return Err(SyncError::RetriesExhausted {
                            attempts: retries - 1,
                            last: cause,
                        });
                    }
                    file.seek(SeekFrom::Start(0))?;
                    (self.sleeper)(self.retry.delay(retries));
                    UploadState::Attempting
                }
                UploadState::Succeeded(entry) => break entry,
            };
        };

        if retries > 0 {
            warn!(%name, retries, "upload succeeded on retry");
        }
        let resource = lookup_mut(tree, node)?;
        resource.assign_ids(&entry);
        resource.assign_mtime(entry.mtime);
        debug!(%name, etag = %resource.etag, "upload committed");
        Ok(true)
    }

    fn exchange(
        &mut self,
        link: &str,
        post: bool,
        meta: &str,
        headers: &HeaderMap,
        file: &mut File,
    ) -> Result<Entry, SyncError> {
        let mut reply = Vec::new();
        let sent = if post {
            self.agent.post(link, meta.as_bytes(), &mut reply, headers)
        } else {
            self.agent
                .put(link, Body::Bytes(meta.as_bytes()), &mut reply, headers)
        };
        let status = sent.map_err(|err| SyncError::agent(Phase::Metadata, err))?;
        ensure_success(Phase::Metadata, status, &reply)?;
        if !reply.is_empty() {
            check_well_formed(&reply).map_err(|err| SyncError::document(Phase::Metadata, err))?;
        }

        let session = self
            .agent
            .redir_location()
            .ok_or(SyncError::MissingSessionUri)?;
        let mut reply = Vec::new();
        let status = self
            .agent
            .put(&session, Body::File(file), &mut reply, &content_headers())
            .map_err(|err| SyncError::agent(Phase::Content, err))?;
        ensure_success(Phase::Content, status, &reply)?;
        Entry::parse(&reply).map_err(|err| SyncError::document(Phase::Content, err))
    }
}

/// Returns the parent of `node` after checking it is a synced folder.
fn check_parent(tree: &ResourceTree, node: NodeId) -> Result<NodeId, PreconditionError> {
    let resource = tree.get(node).ok_or(PreconditionError::UnknownNode(node))?;
    let parent_id = resource
        .parent()
        .ok_or_else(|| PreconditionError::MissingParent(resource.name.clone()))?;
    let parent = tree
        .get(parent_id)
        .ok_or(PreconditionError::UnknownNode(parent_id))?;
    if !parent.is_folder() {
        return Err(PreconditionError::ParentNotFolder(resource.name.clone()));
    }
    if parent.state != State::Sync {
        return Err(PreconditionError::ParentNotSynced {
            name: resource.name.clone(),
            state: parent.state.to_string(),
        });
    }
    Ok(parent_id)
}

fn lookup(tree: &ResourceTree, node: NodeId) -> Result<&Resource, PreconditionError> {
    tree.get(node).ok_or(PreconditionError::UnknownNode(node))
}

fn lookup_mut(tree: &mut ResourceTree, node: NodeId) -> Result<&mut Resource, PreconditionError> {
    tree.get_mut(node).ok_or(PreconditionError::UnknownNode(node))
}

fn ensure_success(phase: Phase, status: u16, body: &[u8]) -> Result<(), SyncError> {
    if is_success(status) {
        Ok(())
    } else {
        Err(SyncError::Status {
            phase,
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }
}

/// An empty ETag means the resource was never seen remotely; no guard is sent.
fn if_match_headers(etag: &str) -> Result<HeaderMap, SyncError> {
    let mut headers = HeaderMap::new();
    if !etag.is_empty() {
        headers.insert(IF_MATCH, HeaderValue::from_str(etag)?);
    }
    Ok(headers)
}

fn metadata_headers(content_length: u64, etag: &str) -> Result<HeaderMap, SyncError> {
    let mut headers = if_match_headers(etag)?;
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(METADATA_CONTENT_TYPE));
    headers.insert(
        HeaderName::from_static("x-upload-content-type"),
        HeaderValue::from_static(UPLOAD_CONTENT_TYPE),
    );
    headers.insert(
        HeaderName::from_static("x-upload-content-length"),
        HeaderValue::from(content_length),
    );
    headers.insert(EXPECT, HeaderValue::from_static(""));
    Ok(headers)
}

fn content_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(EXPECT, HeaderValue::from_static(""));
    headers.insert(ACCEPT, HeaderValue::from_static(""));
    headers
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    target.with_file_name(name)
}
