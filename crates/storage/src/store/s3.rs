//! S3-compatible object store.
//!
//! This module provides an object store implementation for S3-compatible
//! services including AWS S3, Backblaze B2, Tigris (Fly.io), and others.
//!
//! # Keys
//!
//! Store keys always begin with `/` (the hierarchy root). The leading slash
//! is dropped and the configured prefix (if any) is prepended to build the
//! bucket key, and the reverse is applied to listing results.
//!
//! # Leases
//!
//! S3 has no native leases. Exclusive leases are emulated with lock objects
//! under a reserved [`LEASE_NAMESPACE`], created with a conditional
//! `PutObject` (`If-None-Match: *`) so that exactly one caller wins. A lock
//! records its mode, token and expiry. An expired lock is reclaimed by
//! overwriting it with `If-Match` on the ETag it was read with, so of several
//! callers reclaiming the same lock only one succeeds. Reads are atomic snapshots in S3, so
//! shared leases are not persisted: acquiring one only checks that no live
//! exclusive lock exists.
//!
//! Locks only coordinate lease holders. Plain writes and deletes don't
//! consult them.

use super::EntryStream;
use crate::{
    DELIMITER, ObjectStore,
    error::{ErrorKind, Result},
    object::{Entry, LeaseId, LeaseMode, ObjectMeta},
    validate_key,
};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::{ProvideErrorMetadata, SdkError},
    primitives::{ByteStream, DateTime},
};
use exn::ResultExt;
use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;
/// Bucket-relative namespace holding lease lock objects. Never listed.
pub const LEASE_NAMESPACE: &str = ".leases/";
const LOCK_CONTENT_TYPE: &str = "text/plain";

/// S3-compatible object store.
///
/// Stores objects in an S3 bucket, optionally under a key prefix.
///
/// # Examples
///
/// ```no_run
/// use blobfs_storage::store::S3Store;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = S3Store::new(
///     "uploads",
///     "my-bucket",
///     Some("site/".to_string()),
///     "us-west-004",
///     Some("https://s3.us-west-004.backblazeb2.com".to_string()),
///     "access_key_id",
///     "secret_access_key",
/// ).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Store {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Store {
    /// Create a new S3 object store.
    ///
    /// # Arguments
    /// * `name` - A name for this store (used in logging)
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Optional key prefix that every object lives under
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    pub async fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let region = Region::new(region.into());
        let credentials = Credentials::new(key_id, key_secret, None, None, "blobfs-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(region)
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        // Set custom endpoint for non-AWS services
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self::from_client(name, Client::from_conf(config_builder.build()), bucket, prefix)
    }

    /// Wrap an already configured client.
    pub fn from_client(
        name: impl Into<String>,
        client: Client,
        bucket: impl Into<String>,
        prefix: Option<String>,
    ) -> Result<Self> {
        let prefix = match prefix.as_deref().map(|p| p.trim_matches(DELIMITER)) {
            Some(p) if p.contains('\0') => exn::bail!(ErrorKind::InvalidKey(p.to_string())),
            Some("") | None => None,
            Some(p) => Some(p.to_string()),
        };
        Ok(Self {
            name: name.into(),
            client,
            bucket: bucket.into(),
            prefix,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        })
    }

    /// Construct the full S3 key from a store key.
    fn full_key(&self, key: &str) -> Result<String> {
        let relative = validate_key(key)?.trim_start_matches(DELIMITER);
        if relative.starts_with(LEASE_NAMESPACE) {
            exn::bail!(ErrorKind::InvalidKey(key.to_string()));
        }
        Ok(join_prefix(self.prefix.as_deref(), relative))
    }

    /// Full S3 key of the lock object guarding `key`.
    fn lock_key(&self, key: &str) -> Result<String> {
        let relative = validate_key(key)?.trim_start_matches(DELIMITER);
        Ok(join_prefix(self.prefix.as_deref(), &format!("{LEASE_NAMESPACE}{relative}.lock")))
    }

    /// Strip the configured prefix from an S3 key to get the store key.
    ///
    /// Returns `None` for keys outside the prefix or inside the lease
    /// namespace.
    fn store_key(&self, full: &str) -> Option<String> {
        let relative = match &self.prefix {
            Some(prefix) => full.strip_prefix(prefix.as_str())?.strip_prefix(DELIMITER)?,
            None => full,
        };
        (!relative.starts_with(LEASE_NAMESPACE)).then(|| format!("{DELIMITER}{relative}"))
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }

    /// Convert AWS DateTime to OffsetDateTime.
    fn parse_datetime(dt: &DateTime) -> Result<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos())
            .or_raise(|| ErrorKind::BackendError("S3 datetime out of range".to_string()))
    }

    /// The lock object at `lock_key` and its ETag, if there is one.
    async fn read_lock(&self, lock_key: &str) -> Result<Option<(Lock, Option<String>)>> {
        let _permit = self.acquire_permit().await?;
        let output = match self.client.get_object().bucket(&self.bucket).key(lock_key).send().await {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => return Ok(None),
            Err(err) => return Err(classify(err, lock_key)),
        };
        let etag = output.e_tag().map(str::to_string);
        let body = output.body.collect().await.or_raise(|| ErrorKind::Network(lock_key.to_string()))?;
        let body = String::from_utf8_lossy(&body.into_bytes()).into_owned();
        let lock = Lock::parse(&body)
            .ok_or_else(|| exn::Exn::from(ErrorKind::BackendError(format!("malformed lease lock {lock_key}"))))?;
        Ok(Some((lock, etag)))
    }

    /// Write the lock object if `precondition` still holds; `Ok(false)` when
    /// it doesn't.
    async fn write_lock(&self, lock_key: &str, lock: &Lock, precondition: LockPrecondition<'_>) -> Result<bool> {
        let _permit = self.acquire_permit().await?;
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(lock_key)
            .content_type(LOCK_CONTENT_TYPE)
            .body(ByteStream::from(lock.to_string().into_bytes()));
        let request = match precondition {
            LockPrecondition::Absent => request.if_none_match("*"),
            LockPrecondition::Unchanged(etag) => request.if_match(etag),
        };
        match request.send().await {
            Ok(_) => Ok(true),
            Err(err) if is_precondition_failure(&err) => Ok(false),
            Err(err) => Err(classify(err, lock_key)),
        }
    }

    async fn delete_lock(&self, lock_key: &str) -> Result<()> {
        let _permit = self.acquire_permit().await?;
        self.client.delete_object().bucket(&self.bucket).key(lock_key).send().await.map_err(|e| classify(e, lock_key))?;
        Ok(())
    }

    /// Fail unless the lock on `key` is absent, expired, or owned by `lease`.
    async fn ensure_unlocked(&self, key: &str, lease: Option<&LeaseId>) -> Result<()> {
        match self.read_lock(&self.lock_key(key)?).await? {
            Some((lock, _)) if lock.is_live() && lease.is_none_or(|lease| lease.as_str() != lock.token) => {
                exn::bail!(ErrorKind::LeaseConflict(key.to_string()))
            },
            _ => Ok(()),
        }
    }
}

/// Condition a lock write is made under.
enum LockPrecondition<'a> {
    /// No lock object exists.
    Absent,
    /// The lock object still has this ETag.
    Unchanged(&'a str),
}

/// Join a bucket-relative key onto an optional prefix.
fn join_prefix(prefix: Option<&str>, relative: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}{DELIMITER}{relative}"),
        None => relative.to_string(),
    }
}

/// Percent-encode a `CopySource` header value, leaving `/` intact.
fn encode_copy_source(bucket: &str, key: &str) -> String {
    let mut encoded = String::with_capacity(bucket.len() + key.len() + 1);
    encoded.push_str(bucket);
    encoded.push('/');
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn is_precondition_failure<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    // 412 when the lock exists, 409 when a concurrent conditional write to
    // the same key is still in flight.
    matches!(err.code(), Some("PreconditionFailed" | "ConditionalRequestConflict"))
}

/// Classify an SDK failure into the storage error taxonomy.
fn classify<E, R>(err: SdkError<E, R>, key: &str) -> exn::Exn<ErrorKind>
where
    E: std::error::Error + ProvideErrorMetadata + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    let kind = match &err {
        SdkError::TimeoutError(_) => ErrorKind::Timeout(key.to_string()),
        SdkError::DispatchFailure(_) => ErrorKind::Network(key.to_string()),
        _ => match err.code() {
            Some("NoSuchKey" | "NotFound" | "NoSuchBucket") => ErrorKind::NotFound(key.to_string()),
            Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch") => {
                ErrorKind::Network(format!("{key}: credentials rejected"))
            },
            Some(code) => ErrorKind::BackendError(format!("{key}: {code}")),
            None => ErrorKind::BackendError(format!("{key}: {}", DisplayErrorContext(&err))),
        },
    };
    exn::Exn::from(err).raise(kind)
}

/// Render the full source chain of an SDK error on one line.
struct DisplayErrorContext<'a, E>(&'a E);
impl<E: std::error::Error> Display for DisplayErrorContext<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(inner) = source {
            write!(f, ": {inner}")?;
            source = inner.source();
        }
        Ok(())
    }
}

/// Contents of a lease lock object: `mode`, `token` and unix `expires`,
/// one per line.
#[derive(Debug, PartialEq, Eq)]
struct Lock {
    mode: LeaseMode,
    token: String,
    expires: i64,
}
impl Lock {
    fn new(mode: LeaseMode, lease: &LeaseId, duration: Duration) -> Self {
        let seconds = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
        Self {
            mode,
            token: lease.as_str().to_string(),
            expires: OffsetDateTime::now_utc().unix_timestamp().saturating_add(seconds),
        }
    }

    fn parse(body: &str) -> Option<Self> {
        let mut lines = body.lines();
        let mode = LeaseMode::parse(lines.next()?)?;
        let token = lines.next()?.to_string();
        let expires = lines.next()?.parse().ok()?;
        Some(Self { mode, token, expires })
    }

    fn is_live(&self) -> bool {
        self.expires > OffsetDateTime::now_utc().unix_timestamp()
    }
}
impl Display for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n{}\n{}", self.mode, self.token, self.expires)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: &'a str, recursive: bool) -> EntryStream<'a> {
        let relative = prefix.trim_start_matches(DELIMITER);
        let full_prefix = match (&self.prefix, relative) {
            (Some(p), "") => format!("{p}{DELIMITER}"),
            (p, relative) => join_prefix(p.as_deref(), relative),
        };
        Box::pin(stream! {
            let mut continuation: Option<String> = None;
            'pages: loop {
                let page = {
                    let _permit = match self.acquire_permit().await {
                        Ok(permit) => permit,
                        Err(e) => { yield Err(e); break 'pages; },
                    };
                    let mut request = self
                        .client
                        .list_objects_v2()
                        .bucket(&self.bucket)
                        .prefix(&full_prefix)
                        .set_continuation_token(continuation.take());
                    if !recursive {
                        request = request.delimiter(DELIMITER.to_string());
                    }
                    request.send().await
                };
                let page = match page {
                    Ok(page) => page,
                    // Listing failures end the stream: there's no way to
                    // resume without the continuation token.
                    Err(e) => { yield Err(classify(e, prefix)); break 'pages; },
                };
                // S3 returns objects and common prefixes in separate lists,
                // each sorted. Merge them to keep the key order promise.
                let mut entries = Vec::new();
                for object in page.contents() {
                    let Some(key) = object.key().and_then(|k| self.store_key(k)) else { continue };
                    let modified = match object.last_modified().map(Self::parse_datetime).transpose() {
                        Ok(modified) => modified.unwrap_or_else(OffsetDateTime::now_utc),
                        Err(e) => { yield Err(e); continue; },
                    };
                    let size = object.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0);
                    entries.push(Entry::Object(ObjectMeta::new(key, size, modified)));
                }
                for common in page.common_prefixes() {
                    if let Some(key) = common.prefix().and_then(|p| self.store_key(p)) {
                        entries.push(Entry::Prefix(key));
                    }
                }
                entries.sort_by(|a, b| a.key().cmp(b.key()));
                for entry in entries {
                    yield Ok(entry);
                }
                match page.next_continuation_token() {
                    Some(token) if page.is_truncated().unwrap_or(false) => continuation = Some(token.to_string()),
                    _ => break 'pages,
                }
            }
        })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        match self.client.head_object().bucket(&self.bucket).key(&full).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(classify(err, key)),
        }
    }

    async fn stat(&self, key: &str) -> Result<ObjectMeta> {
        let full = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        let output = self.client.head_object().bucket(&self.bucket).key(&full).send().await.map_err(|e| {
            match e.as_service_error().is_some_and(|s| s.is_not_found()) {
                true => exn::Exn::from(e).raise(ErrorKind::NotFound(key.to_string())),
                false => classify(e, key),
            }
        })?;
        let modified = output
            .last_modified()
            .map(Self::parse_datetime)
            .transpose()?
            .unwrap_or_else(OffsetDateTime::now_utc);
        let size = output.content_length().and_then(|s| u64::try_from(s).ok()).unwrap_or(0);
        let meta = ObjectMeta::new(key, size, modified);
        Ok(match output.content_type() {
            Some(content_type) => meta.with_content_type(content_type),
            None => meta,
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let full = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        let output = self.client.get_object().bucket(&self.bucket).key(&full).send().await.map_err(|e| classify(e, key))?;
        let body = output.body.collect().await.or_raise(|| ErrorKind::Network(key.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn put(&self, key: &str, data: &[u8], content_type: Option<&str>) -> Result<()> {
        let full = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full)
            .set_content_type(content_type.map(str::to_string))
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| classify(e, key))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // S3 happily "deletes" keys that never existed.
        if !self.exists(key).await? {
            exn::bail!(ErrorKind::NotFound(key.to_string()));
        }
        let full = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        self.client.delete_object().bucket(&self.bucket).key(&full).send().await.map_err(|e| classify(e, key))?;
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str, lease: Option<&LeaseId>) -> Result<()> {
        let from_full = self.full_key(from)?;
        let to_full = self.full_key(to)?;
        self.ensure_unlocked(from, lease).await?;
        if from != to {
            self.ensure_unlocked(to, lease).await?;
        }
        if from_full == to_full {
            // S3 refuses to copy an object onto itself without changing
            // anything; the result would be identical anyway.
            return match self.exists(from).await? {
                true => Ok(()),
                false => exn::bail!(ErrorKind::NotFound(from.to_string())),
            };
        }
        let _permit = self.acquire_permit().await?;
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(encode_copy_source(&self.bucket, &from_full))
            .key(&to_full)
            .send()
            .await
            .map_err(|e| classify(e, from))?;
        Ok(())
    }

    async fn acquire_lease(&self, key: &str, mode: LeaseMode, duration: Duration) -> Result<LeaseId> {
        if !self.exists(key).await? {
            exn::bail!(ErrorKind::NotFound(key.to_string()));
        }
        let lock_key = self.lock_key(key)?;
        let lease = LeaseId::generate();
        if mode == LeaseMode::Shared {
            self.ensure_unlocked(key, None).await?;
            return Ok(lease);
        }
        let lock = Lock::new(mode, &lease, duration);
        if self.write_lock(&lock_key, &lock, LockPrecondition::Absent).await? {
            return Ok(lease);
        }
        let acquired = match self.read_lock(&lock_key).await? {
            Some((existing, _)) if existing.is_live() => false,
            Some((_, Some(etag))) => {
                tracing::debug!(store = %self.name, key, "Reclaiming expired lease lock");
                self.write_lock(&lock_key, &lock, LockPrecondition::Unchanged(&etag)).await?
            },
            // An expired lock without an ETag can't be replaced safely.
            Some((_, None)) => false,
            // Released between our write and our read.
            None => self.write_lock(&lock_key, &lock, LockPrecondition::Absent).await?,
        };
        match acquired {
            true => Ok(lease),
            false => exn::bail!(ErrorKind::LeaseConflict(key.to_string())),
        }
    }

    async fn release_lease(&self, key: &str, lease: &LeaseId) -> Result<()> {
        let lock_key = self.lock_key(key)?;
        match self.read_lock(&lock_key).await? {
            Some((lock, _)) if lock.token == lease.as_str() => self.delete_lock(&lock_key).await,
            Some((lock, _)) if lock.is_live() => exn::bail!(ErrorKind::LeaseConflict(key.to_string())),
            // Never persisted (shared), already expired, or reclaimed.
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_sdk_s3::operation::get_object::GetObjectOutput;
    use aws_sdk_s3::operation::head_object::{HeadObjectError, HeadObjectOutput};
    use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
    use aws_sdk_s3::operation::put_object::{PutObjectError, PutObjectOutput};
    use aws_sdk_s3::types::error::NotFound;
    use aws_sdk_s3::types::{CommonPrefix, Object};
    use aws_smithy_mocks::{RuleMode, mock, mock_client};
    use rstest::rstest;

    fn store(client: Client, prefix: Option<&str>) -> S3Store {
        S3Store::from_client("test", client, "bucket", prefix.map(str::to_string)).unwrap()
    }

    /// A client that is never sent anything; for key mapping tests.
    fn offline(prefix: Option<&str>) -> S3Store {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        store(Client::from_conf(config), prefix)
    }

    #[rstest]
    #[case(None, "/cux/bux/foo.txt", "cux/bux/foo.txt")]
    #[case(Some("site"), "/cux/bux/foo.txt", "site/cux/bux/foo.txt")]
    #[case(Some("site/"), "/cux/bux/", "site/cux/bux/")]
    #[case(Some("/site/"), "/a", "site/a")]
    fn test_full_key(#[case] prefix: Option<&str>, #[case] key: &str, #[case] expected: &str) {
        assert_eq!(offline(prefix).full_key(key).unwrap(), expected);
    }

    #[test]
    fn test_full_key_rejects_lease_namespace() {
        let err = offline(None).full_key("/.leases/a.lock").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
    }

    #[rstest]
    #[case(None, "cux/foo.txt", Some("/cux/foo.txt"))]
    #[case(Some("site"), "site/cux/foo.txt", Some("/cux/foo.txt"))]
    #[case(Some("site"), "other/cux/foo.txt", None)]
    #[case(Some("site"), "site/.leases/cux/foo.txt.lock", None)]
    #[case(None, ".leases/foo.txt.lock", None)]
    fn test_store_key(#[case] prefix: Option<&str>, #[case] full: &str, #[case] expected: Option<&str>) {
        assert_eq!(offline(prefix).store_key(full).as_deref(), expected);
    }

    #[test]
    fn test_lock_key() {
        assert_eq!(offline(Some("site")).lock_key("/cux/foo.txt").unwrap(), "site/.leases/cux/foo.txt.lock");
    }

    #[rstest]
    #[case("site/cux/foo.txt", "bucket/site/cux/foo.txt")]
    #[case("a b+c.txt", "bucket/a%20b%2Bc.txt")]
    #[case("ünï.txt", "bucket/%C3%BCn%C3%AF.txt")]
    fn test_encode_copy_source(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(encode_copy_source("bucket", key), expected);
    }

    #[test]
    fn test_lock_round_trip() {
        let lease = LeaseId::generate();
        let lock = Lock::new(LeaseMode::Exclusive, &lease, Duration::from_secs(60));
        assert!(lock.is_live());
        assert_eq!(Lock::parse(&lock.to_string()), Some(lock));
        assert_eq!(Lock::parse("exclusive\ntoken"), None);
        let expired = Lock::parse("exclusive\ntoken\n0").unwrap();
        assert!(!expired.is_live());
    }

    fn found_rule() -> aws_smithy_mocks::Rule {
        mock!(aws_sdk_s3::Client::head_object).match_requests(|req| req.key() == Some("cux/foo.txt")).then_output(|| {
            HeadObjectOutput::builder()
                .content_length(5)
                .content_type("text/plain")
                .last_modified(DateTime::from_secs(1_700_000_000))
                .build()
        })
    }

    fn missing_rule() -> aws_smithy_mocks::Rule {
        mock!(aws_sdk_s3::Client::head_object)
            .match_requests(|req| req.key() == Some("cux/missing.txt"))
            .then_error(|| HeadObjectError::NotFound(NotFound::builder().build()))
    }

    #[tokio::test]
    async fn test_get() {
        let rule = mock!(aws_sdk_s3::Client::get_object)
            .match_requests(|req| req.bucket() == Some("bucket") && req.key() == Some("site/cux/foo.txt"))
            .then_output(|| GetObjectOutput::builder().body(ByteStream::from_static(b"hello")).build());
        let store = store(mock_client!(aws_sdk_s3, [&rule]), Some("site"));
        assert_eq!(store.get("/cux/foo.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_exists() {
        let found = found_rule();
        assert!(store(mock_client!(aws_sdk_s3, [&found]), None).exists("/cux/foo.txt").await.unwrap());
        let missing = missing_rule();
        assert!(!store(mock_client!(aws_sdk_s3, [&missing]), None).exists("/cux/missing.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_stat() {
        let found = found_rule();
        let meta = store(mock_client!(aws_sdk_s3, [&found]), None).stat("/cux/foo.txt").await.unwrap();
        assert_eq!(meta.key, "/cux/foo.txt");
        assert_eq!(meta.size, 5);
        assert_eq!(meta.content_type.as_deref(), Some("text/plain"));
        assert_eq!(meta.last_modified.unix_timestamp(), 1_700_000_000);
        let missing = missing_rule();
        let err = store(mock_client!(aws_sdk_s3, [&missing]), None).stat("/cux/missing.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_merges_objects_and_prefixes() {
        let rule = mock!(aws_sdk_s3::Client::list_objects_v2)
            .match_requests(|req| req.prefix() == Some("site/d/") && req.delimiter() == Some("/"))
            .then_output(|| {
                ListObjectsV2Output::builder()
                    .contents(Object::builder().key("site/d/").size(0).build())
                    .contents(Object::builder().key("site/d/zeta.txt").size(3).build())
                    .common_prefixes(CommonPrefix::builder().prefix("site/d/alpha/").build())
                    .is_truncated(false)
                    .build()
            });
        let store = store(mock_client!(aws_sdk_s3, [&rule]), Some("site"));
        let keys: Vec<_> =
            store.list("/d/", false).await.unwrap().iter().map(|entry| entry.key().to_string()).collect();
        assert_eq!(keys, ["/d/", "/d/alpha/", "/d/zeta.txt"]);
    }

    const LOCK_KEY: &str = ".leases/cux/foo.txt.lock";

    fn lock_exists_rule() -> aws_smithy_mocks::Rule {
        mock!(aws_sdk_s3::Client::put_object)
            .match_requests(|req| req.key() == Some(LOCK_KEY) && req.if_none_match() == Some("*"))
            .then_error(|| PutObjectError::generic(ErrorMetadata::builder().code("PreconditionFailed").build()))
    }

    fn expired_lock_rule() -> aws_smithy_mocks::Rule {
        mock!(aws_sdk_s3::Client::get_object).match_requests(|req| req.key() == Some(LOCK_KEY)).then_output(|| {
            GetObjectOutput::builder()
                .e_tag("\"v1\"")
                .body(ByteStream::from_static(b"exclusive\nabandoned\n0"))
                .build()
        })
    }

    #[tokio::test]
    async fn test_expired_lock_is_replaced_conditionally() {
        let (found, exists, expired) = (found_rule(), lock_exists_rule(), expired_lock_rule());
        let replace = mock!(aws_sdk_s3::Client::put_object)
            .match_requests(|req| req.key() == Some(LOCK_KEY) && req.if_match() == Some("\"v1\""))
            .then_output(|| PutObjectOutput::builder().build());
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&found, &exists, &expired, &replace]);
        store(client, None).acquire_lease("/cux/foo.txt", LeaseMode::Exclusive, Duration::from_secs(60)).await.unwrap();
        assert_eq!(replace.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_losing_a_reclaim_race_conflicts() {
        let (found, exists, expired) = (found_rule(), lock_exists_rule(), expired_lock_rule());
        // Someone else replaced the expired lock between our read and write.
        let replaced = mock!(aws_sdk_s3::Client::put_object)
            .match_requests(|req| req.key() == Some(LOCK_KEY) && req.if_match() == Some("\"v1\""))
            .then_error(|| PutObjectError::generic(ErrorMetadata::builder().code("PreconditionFailed").build()));
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&found, &exists, &expired, &replaced]);
        let err = store(client, None)
            .acquire_lease("/cux/foo.txt", LeaseMode::Exclusive, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::LeaseConflict(key) if key == "/cux/foo.txt"));
        assert_eq!(replaced.num_calls(), 1);
    }
}
