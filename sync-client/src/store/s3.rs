//! Amazon S3 backend.

use super::{
    CopyRequest, ListPage, MetadataDirective, ObjectStore, ObjectStream, StorageError, WritePolicy,
};
use crate::registry::StoreFactory;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, MetadataDirective as S3MetadataDirective,
    ServerSideEncryption, StorageClass,
};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, TryStreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::sync::Arc;
use sync_types::{Fingerprint, ObjectRecord, RegionConfig};

/// Bodies up to this size are sent with one `PutObject`.
pub const PART_SIZE: u64 = 16 * 1024 * 1024;

/// Most parts a multipart upload may have.
pub const MAX_PARTS: u64 = 10_000;

/// Characters `encodeURIComponent` leaves alone, plus the path separator.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'/');

/// Load the shared SDK configuration regional clients are derived from.
///
/// With `credentials` the base account uses those static keys; otherwise
/// the default provider chain (environment, profile, instance role) applies.
pub async fn base_config(credentials: Option<(&str, &str)>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some((access_key, secret_key)) = credentials {
        loader = loader.credentials_provider(Credentials::new(
            access_key,
            secret_key,
            None,
            None,
            "bucket-sync-base",
        ));
    }
    loader.load().await
}

/// Builds one [`S3Store`] per region from a shared base configuration.
#[derive(Debug, Clone)]
pub struct S3StoreFactory {
    base: SdkConfig,
    policy: WritePolicy,
}

impl S3StoreFactory {
    /// Create a factory.
    pub fn new(base: SdkConfig, policy: WritePolicy) -> Self {
        Self { base, policy }
    }
}

impl StoreFactory for S3StoreFactory {
    fn connect(&self, region: &RegionConfig) -> Arc<dyn ObjectStore> {
        let mut builder =
            aws_sdk_s3::config::Builder::from(&self.base).region(Region::new(region.id.clone()));
        if let Some((access_key, secret_key)) = region.credentials() {
            builder = builder.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "bucket-sync-region",
            ));
        }
        tracing::debug!(
            "Connected S3 client for region {} (account {})",
            region.id,
            region.account()
        );
        Arc::new(S3Store::new(
            Client::from_conf(builder.build()),
            self.policy.clone(),
        ))
    }
}

/// [`ObjectStore`] backed by an `aws_sdk_s3::Client`.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    policy: WritePolicy,
}

impl S3Store {
    /// Wrap a client.
    pub fn new(client: Client, policy: WritePolicy) -> Self {
        Self { client, policy }
    }

    fn encryption(&self) -> ServerSideEncryption {
        ServerSideEncryption::from(self.policy.server_side_encryption.as_str())
    }

    fn storage_class(&self) -> StorageClass {
        StorageClass::from(self.policy.storage_class.as_str())
    }

    async fn put_single(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectStream,
        content_length: u64,
    ) -> Result<(), StorageError> {
        let data = collect_exact(body, content_length).await?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_length(content_length as i64)
            .server_side_encryption(self.encryption())
            .storage_class(self.storage_class())
            .send()
            .await
            .map_err(|e| api_error("PutObject", e))?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectStream,
        content_length: u64,
    ) -> Result<(), StorageError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .server_side_encryption(self.encryption())
            .storage_class(self.storage_class())
            .send()
            .await
            .map_err(|e| api_error("CreateMultipartUpload", e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::Malformed("multipart upload without id".into()))?
            .to_string();

        let parts = match self
            .upload_parts(bucket, key, &upload_id, body, content_length)
            .await
        {
            Ok(parts) => parts,
            Err(e) => {
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        "Failed to abort multipart upload {} for {}/{}: {}",
                        upload_id,
                        bucket,
                        key,
                        DisplayErrorContext(abort)
                    );
                }
                return Err(e);
            }
        };

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| api_error("CompleteMultipartUpload", e))?;
        Ok(())
    }

    /// Upload parts sequentially so at most one part is buffered.
    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        mut body: ObjectStream,
        content_length: u64,
    ) -> Result<Vec<CompletedPart>, StorageError> {
        let part_size = part_size_for(content_length) as usize;
        let mut parts = Vec::new();
        let mut buffer = BytesMut::with_capacity(part_size);
        let mut streamed = 0u64;

        loop {
            let chunk = body.try_next().await?;
            let finished = chunk.is_none();
            if let Some(chunk) = chunk {
                streamed += chunk.len() as u64;
                if streamed > content_length {
                    return Err(StorageError::LengthMismatch {
                        expected: content_length,
                        actual: streamed,
                    });
                }
                buffer.extend_from_slice(&chunk);
            }

            while buffer.len() >= part_size || (finished && !buffer.is_empty()) {
                let take = part_size.min(buffer.len());
                let part = buffer.split_to(take).freeze();
                let number = parts.len() as i32 + 1;
                parts.push(self.upload_part(bucket, key, upload_id, number, part).await?);
            }

            if finished {
                break;
            }
        }

        if streamed != content_length {
            return Err(StorageError::LengthMismatch {
                expected: content_length,
                actual: streamed,
            });
        }
        Ok(parts)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        number: i32,
        data: Bytes,
    ) -> Result<CompletedPart, StorageError> {
        let length = data.len() as i64;
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(number)
            .content_length(length)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| api_error("UploadPart", e))?;
        Ok(CompletedPart::builder()
            .set_e_tag(output.e_tag().map(str::to_string))
            .part_number(number)
            .build())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        let output = self
            .client
            .list_objects()
            .bucket(bucket)
            .prefix(prefix)
            .set_marker(marker.map(str::to_string))
            .send()
            .await
            .map_err(|e| api_error("ListObjects", e))?;

        let objects = output
            .contents()
            .iter()
            .map(|object| {
                let key = object
                    .key()
                    .ok_or_else(|| StorageError::Malformed("listing entry without key".into()))?;
                let last_modified = object
                    .last_modified()
                    .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos()))
                    .ok_or_else(|| {
                        StorageError::Malformed(format!("no usable LastModified for {}", key))
                    })?;
                Ok(ObjectRecord {
                    key: key.to_string(),
                    last_modified,
                    fingerprint: Fingerprint::new(object.e_tag().unwrap_or_default()),
                    size: object.size().unwrap_or_default().max(0) as u64,
                })
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        Ok(ListPage {
            objects,
            truncated: output.is_truncated().unwrap_or(false),
        })
    }

    async fn copy_object(&self, request: &CopyRequest) -> Result<(), StorageError> {
        let directive = match request.directive {
            MetadataDirective::Copy => S3MetadataDirective::Copy,
            MetadataDirective::Replace => S3MetadataDirective::Replace,
        };
        self.client
            .copy_object()
            .copy_source(copy_source(&request.source_bucket, &request.source_key))
            .bucket(&request.bucket)
            .key(&request.key)
            .metadata_directive(directive)
            .server_side_encryption(self.encryption())
            .storage_class(self.storage_class())
            .send()
            .await
            .map_err(|e| api_error("CopyObject", e))?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| api_error("GetObject", e))?;

        let stream = futures_util::stream::try_unfold(output.body, |mut body| async move {
            match body.try_next().await {
                Ok(Some(chunk)) => Ok(Some((chunk, body))),
                Ok(None) => Ok(None),
                Err(e) => Err(StorageError::Stream(e.to_string())),
            }
        });
        Ok(stream.boxed())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectStream,
        content_length: u64,
    ) -> Result<(), StorageError> {
        if content_length <= PART_SIZE {
            self.put_single(bucket, key, body, content_length).await
        } else {
            self.put_multipart(bucket, key, body, content_length).await
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| api_error("DeleteObject", e))?;
        Ok(())
    }
}

/// Part size for a multipart upload of `content_length` bytes.
///
/// Grows beyond [`PART_SIZE`] only when the body would otherwise need more
/// than [`MAX_PARTS`] parts.
pub fn part_size_for(content_length: u64) -> u64 {
    PART_SIZE.max(content_length.div_ceil(MAX_PARTS))
}

/// URL-encoded `bucket/key` for the `x-amz-copy-source` header.
pub fn copy_source(bucket: &str, key: &str) -> String {
    utf8_percent_encode(&format!("{}/{}", bucket, key), COPY_SOURCE).to_string()
}

/// Buffer a whole body, failing if it is not exactly `expected` bytes long.
async fn collect_exact(mut body: ObjectStream, expected: u64) -> Result<Bytes, StorageError> {
    let mut buffer = BytesMut::with_capacity(expected as usize);
    while let Some(chunk) = body.try_next().await? {
        buffer.extend_from_slice(&chunk);
        if buffer.len() as u64 > expected {
            break;
        }
    }
    let actual = buffer.len() as u64;
    if actual != expected {
        return Err(StorageError::LengthMismatch { expected, actual });
    }
    Ok(buffer.freeze())
}

fn api_error<E>(operation: &'static str, err: E) -> StorageError
where
    E: std::error::Error + 'static,
{
    StorageError::Api {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_source_matches_uri_component_encoding() {
        assert_eq!(copy_source("bucket", "a/b c.txt"), "bucket/a/b%20c.txt");
        assert_eq!(copy_source("bucket", "x+y&z"), "bucket/x%2By%26z");
        assert_eq!(copy_source("bucket", "it's(1)!"), "bucket/it's(1)!");
        assert_eq!(copy_source("bucket", "日"), "bucket/%E6%97%A5");
    }

    #[test]
    fn part_size_stays_at_minimum_for_normal_objects() {
        assert_eq!(part_size_for(PART_SIZE + 1), PART_SIZE);
        assert_eq!(part_size_for(100 * PART_SIZE), PART_SIZE);
    }

    #[test]
    fn part_size_grows_to_respect_part_limit() {
        let huge = 5 * 1024 * 1024 * 1024 * 1024; // 5 TiB
        let size = part_size_for(huge);
        assert!(size > PART_SIZE);
        assert!(huge.div_ceil(size) <= MAX_PARTS);
    }

    #[tokio::test]
    async fn collect_exact_checks_length() {
        let body: ObjectStream = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"de")),
        ])
        .boxed();
        assert_eq!(collect_exact(body, 5).await.unwrap(), "abcde");

        let body: ObjectStream =
            futures_util::stream::iter(vec![Ok(Bytes::from_static(b"abc"))]).boxed();
        assert!(matches!(
            collect_exact(body, 4).await,
            Err(StorageError::LengthMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }
}
