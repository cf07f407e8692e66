use crate::errors::AppError;
use crate::models::{InteractionRecord, Opportunity, OpportunityStage};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

/// Client for the collaborating CRM backend.
///
/// The board is seeded from here and stage changes / interactions are pushed
/// back. The service stays usable when the backend is unreachable; callers
/// treat every method as best-effort and fall back to local state.
#[derive(Clone)]
pub struct CrmGatewayClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl CrmGatewayClient {
    /// Creates a new `CrmGatewayClient`.
    pub fn new(base_url: String, token: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create CRM client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Fetches the opportunity list used to seed the pipeline board.
    pub async fn get_opportunities(&self) -> Result<Vec<Opportunity>, AppError> {
        let url = format!("{}/api/opportunities?size=100", self.base_url);
        tracing::info!("Fetching opportunities from CRM: {}", url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("CRM request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "CRM returned {}: {}",
                status, error_text
            )));
        }

        let data = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse CRM response: {}", e))
        })?;

        Ok(data)
    }

    /// Persists a stage change decided on the board.
    pub async fn change_stage(
        &self,
        opportunity_id: Uuid,
        stage: OpportunityStage,
        probability: i32,
    ) -> Result<(), AppError> {
        let url = format!(
            "{}/api/opportunities/{}/stage",
            self.base_url, opportunity_id
        );
        tracing::info!(
            "Persisting stage change for {} to {:?} in CRM",
            opportunity_id,
            stage
        );

        let body = json!({
            "stage": stage,
            "probability": probability,
        });

        let response = self
            .client
            .put(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Stage change failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "CRM stage change failed {}: {}",
                status, error_text
            )));
        }

        tracing::info!("✓ Stage change persisted for {}", opportunity_id);
        Ok(())
    }

    /// Records a contact interaction in the CRM.
    pub async fn record_interaction(&self, record: &InteractionRecord) -> Result<(), AppError> {
        let url = format!("{}/api/contact-interactions", self.base_url);
        tracing::debug!(
            "Recording {:?} interaction for contact {} in CRM",
            record.action_type,
            record.contact_id
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(record)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Failed to record interaction: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "CRM interaction recording failed {}: {}",
                status, error_text
            )));
        }

        Ok(())
    }

    /// Pings the CRM health endpoint. Used by the connectivity monitor.
    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
