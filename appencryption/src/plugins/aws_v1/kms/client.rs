//! AWS KMS client implementation using AWS SDK v1
//!
//! This module provides a client for AWS KMS operations using the rusoto SDK.

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// Response from the GenerateDataKey operation
#[derive(Clone, Debug)]
pub struct GenerateDataKeyResponse {
    /// The Amazon Resource Name (ARN) of the CMK that encrypted the data key
    pub key_id: String,

    /// The encrypted data key
    pub ciphertext_blob: Vec<u8>,

    /// The plaintext data key
    pub plaintext: Vec<u8>,
}

/// AWS KMS client trait
#[async_trait]
pub trait AwsKmsClient: Send + Sync + fmt::Debug {
    /// Encrypts data using a KMS key
    async fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypts data that was encrypted with a KMS key
    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Generates a data key using a KMS key
    async fn generate_data_key(&self, key_id: &str) -> Result<GenerateDataKeyResponse>;

    /// Returns the region for this client
    fn region(&self) -> &str;
}

// Note: Here we'd normally use the rusoto crate, but since it's deprecated,
// we'll implement a simulated version for this example
// In a real implementation, this would use rusoto_core and rusoto_kms

/// Standard implementation of AwsKmsClient using rusoto SDK
#[derive(Debug)]
pub struct StandardAwsKmsClient {
    /// AWS region
    region: String,
    // In a real implementation, we'd have:
    // client: rusoto_kms::KmsClient,
}

impl StandardAwsKmsClient {
    /// Creates a new StandardAwsKmsClient
    pub fn new(region: String) -> Result<Self> {
        // In a real implementation, we'd create the client like:
        // let region = rusoto_core::Region::from_str(&region)
        //    .map_err(|e| Error::Kms(format!("Invalid region: {}", e)))?;
        // let client = rusoto_kms::KmsClient::new(region);

        Ok(Self { region })
    }

    /// Creates a new StandardAwsKmsClient with a custom endpoint
    pub fn with_endpoint(region: String, _endpoint: String) -> Result<Self> {
        // In a real implementation, we'd create the client with a custom endpoint:
        // let region = rusoto_core::Region::Custom {
        //    name: region.clone(),
        //    endpoint: endpoint,
        // };
        // let client = rusoto_kms::KmsClient::new(region);

        Ok(Self { region })
    }
}

#[async_trait]
impl AwsKmsClient for StandardAwsKmsClient {
    async fn encrypt(&self, _key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        // In a real implementation, we'd call:
        // let input = rusoto_kms::EncryptRequest {
        //     key_id: key_id.to_string(),
        //     plaintext: plaintext.to_vec().into(),
        //     encryption_context: None,
        //     grant_tokens: None,
        // };
        //
        // let output = self.client.encrypt(input).await
        //     .map_err(|e| Error::Kms(format!("Failed to encrypt: {}", e)))?;
        //
        // output.ciphertext_blob
        //     .map(|b| b.to_vec())
        //     .ok_or_else(|| Error::Kms("No ciphertext blob returned".into()))

        // For this example, we'll just return a mock encrypted value
        Ok(plaintext.to_vec())
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        // In a real implementation, we'd call:
        // let input = rusoto_kms::DecryptRequest {
        //     ciphertext_blob: ciphertext.to_vec().into(),
        //     encryption_context: None,
        //     grant_tokens: None,
        //     key_id: None,
        // };
        //
        // let output = self.client.decrypt(input).await
        //     .map_err(|e| Error::Kms(format!("Failed to decrypt: {}", e)))?;
        //
        // output.plaintext
        //     .map(|b| b.to_vec())
        //     .ok_or_else(|| Error::Kms("No plaintext returned".into()))

        // For this example, we'll just return a mock decrypted value
        Ok(ciphertext.to_vec())
    }

    async fn generate_data_key(&self, key_id: &str) -> Result<GenerateDataKeyResponse> {
        // In a real implementation, we'd call:
        // let input = rusoto_kms::GenerateDataKeyRequest {
        //     key_id: key_id.to_string(),
        //     encryption_context: None,
        //     grant_tokens: None,
        //     key_spec: Some("AES_256".to_string()),
        //     number_of_bytes: None,
        // };
        //
        // let output = self.client.generate_data_key(input).await
        //     .map_err(|e| Error::Kms(format!("Failed to generate data key: {}", e)))?;
        //
        // let key_id = output.key_id.unwrap_or_else(|| key_id.to_string());
        // let ciphertext_blob = output.ciphertext_blob
        //     .map(|b| b.to_vec())
        //     .ok_or_else(|| Error::Kms("No ciphertext blob returned".into()))?;
        // let plaintext = output.plaintext
        //     .map(|b| b.to_vec())
        //     .ok_or_else(|| Error::Kms("No plaintext returned".into()))?;

        // For this example, we'll just return mock values
        let plaintext = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        let ciphertext_blob = vec![16, 15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1];

        Ok(GenerateDataKeyResponse {
            key_id: key_id.to_string(),
            ciphertext_blob,
            plaintext,
        })
    }

    fn region(&self) -> &str {
        &self.region
    }
}
