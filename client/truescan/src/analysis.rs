use std::{sync::Arc, time::Duration};

use crate::api::AnalysisApi;
use crate::auth::AuthClient;
use crate::cancel::{guarded, CancelSignal, RequestSlot};
use crate::error::ServiceError;
use crate::models::{AnalysisReport, AnalysisTask, TaskResult, TaskStatus};
use crate::poller::TaskPoller;
use crate::transport::FilePart;

const POLL_HINT: Duration = Duration::from_secs(1);

pub struct AnalysisService {
    auth: Arc<AuthClient>,
    api: Arc<dyn AnalysisApi>,
    poller: TaskPoller,
    apphud_id: String,
    slot: RequestSlot,
}

impl AnalysisService {
    pub fn new(
        auth: Arc<AuthClient>,
        api: Arc<dyn AnalysisApi>,
        poller: TaskPoller,
        apphud_id: String,
    ) -> Self {
        Self {
            auth,
            api,
            poller,
            apphud_id,
            slot: RequestSlot::new(),
        }
    }

    pub fn cancel_current(&self) {
        self.slot.cancel_current();
    }

    pub async fn analyze(
        &self,
        files: Vec<FilePart>,
        conversation: Option<&str>,
    ) -> Result<AnalysisReport, ServiceError> {
        let cancel = self.slot.begin();
        let outcome = self.run_analysis(files, conversation, &cancel).await;
        self.slot.finish(&cancel);

        let task = outcome?;
        match (task.status, task.result) {
            (TaskStatus::Finished, Some(TaskResult::Details(report))) => {
                tracing::info!(
                    task_id = %task.id,
                    risk_score = report.risk_score,
                    red_flags = report.red_flags.len(),
                    "analysis finished"
                );
                Ok(report)
            }
            (TaskStatus::Finished, Some(TaskResult::Message(message))) => {
                Err(ServiceError::Message(message))
            }
            (TaskStatus::Finished, None) => Err(ServiceError::EmptyResult),
            (TaskStatus::Failed, _) => Err(failure(task.error)),
            (status, _) => Err(ServiceError::Failed(format!(
                "unexpected status: {}",
                status.as_str()
            ))),
        }
    }

    // The backend answers place lookups with a free-text message.
    pub async fn identify_place(
        &self,
        file: FilePart,
        conversation: Option<&str>,
    ) -> Result<String, ServiceError> {
        let cancel = self.slot.begin();
        let outcome = self.run_place(file, conversation, &cancel).await;
        self.slot.finish(&cancel);

        let task = outcome?;
        match (task.status, task.result) {
            (TaskStatus::Finished, Some(TaskResult::Message(message))) => {
                tracing::info!(task_id = %task.id, "place identified");
                Ok(message)
            }
            (TaskStatus::Finished, Some(TaskResult::Details(_))) => Err(ServiceError::Failed(
                "expected a location answer, got a risk report".to_string(),
            )),
            (TaskStatus::Finished, None) => Err(ServiceError::EmptyResult),
            (TaskStatus::Failed, _) => Err(failure(task.error)),
            (status, _) => Err(ServiceError::Failed(format!(
                "unexpected status: {}",
                status.as_str()
            ))),
        }
    }

    async fn run_analysis(
        &self,
        files: Vec<FilePart>,
        conversation: Option<&str>,
        cancel: &CancelSignal,
    ) -> Result<AnalysisTask, ServiceError> {
        guarded(cancel, self.auth.ensure_authorized(&self.apphud_id)).await?;
        let created = guarded(cancel, self.api.create_analysis_task(files, conversation)).await?;
        self.settle(created, cancel).await
    }

    async fn run_place(
        &self,
        file: FilePart,
        conversation: Option<&str>,
        cancel: &CancelSignal,
    ) -> Result<AnalysisTask, ServiceError> {
        guarded(cancel, self.auth.ensure_authorized(&self.apphud_id)).await?;
        let created = guarded(cancel, self.api.create_place_task(file, conversation)).await?;
        self.settle(created, cancel).await
    }

    async fn settle(
        &self,
        created: AnalysisTask,
        cancel: &CancelSignal,
    ) -> Result<AnalysisTask, ServiceError> {
        checkpoint(cancel)?;
        // Already terminal on create: nothing to poll.
        if created.status.is_terminal() {
            return Ok(created);
        }
        let task = self
            .poller
            .wait_for_analysis_result(created.id, POLL_HINT, cancel)
            .await?;
        checkpoint(cancel)?;
        Ok(task)
    }
}

fn checkpoint(cancel: &CancelSignal) -> Result<(), ServiceError> {
    if cancel.is_cancelled() {
        return Err(ServiceError::Cancelled);
    }
    Ok(())
}

fn failure(error: Option<String>) -> ServiceError {
    ServiceError::Failed(error.unwrap_or_else(|| "Analysis failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenStorage;
    use crate::error::ApiError;
    use crate::models::ReverseSearchTask;
    use crate::poller::PollerConfig;
    use crate::stores::TokensStore;
    use crate::transport::HttpClient;
    use async_trait::async_trait;
    use reqwest::Url;
    use std::sync::Mutex;
    use uuid::Uuid;

    // Answers create with `created` and every poll with `polled`.
    struct CannedApi {
        created: Mutex<Option<AnalysisTask>>,
        polled: AnalysisTask,
        hang_on_create: bool,
    }

    #[async_trait]
    impl AnalysisApi for CannedApi {
        async fn create_analysis_task(
            &self,
            _files: Vec<FilePart>,
            _conversation: Option<&str>,
        ) -> Result<AnalysisTask, ApiError> {
            if self.hang_on_create {
                return std::future::pending().await;
            }
            self.created
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| ApiError::InvalidRequest("created twice".into()))
        }

        async fn create_place_task(
            &self,
            file: FilePart,
            conversation: Option<&str>,
        ) -> Result<AnalysisTask, ApiError> {
            self.create_analysis_task(vec![file], conversation).await
        }

        async fn get_analysis_task(&self, _id: Uuid) -> Result<AnalysisTask, ApiError> {
            Ok(self.polled.clone())
        }

        async fn create_reverse_search(&self, _image: FilePart) -> Result<Uuid, ApiError> {
            Err(ApiError::InvalidRequest("not scripted".into()))
        }

        async fn get_reverse_search(&self, _id: Uuid) -> Result<ReverseSearchTask, ApiError> {
            Err(ApiError::InvalidRequest("not scripted".into()))
        }
    }

    fn task(status: TaskStatus, result: Option<TaskResult>, error: Option<&str>) -> AnalysisTask {
        AnalysisTask {
            id: Uuid::new_v4(),
            status,
            result,
            error: error.map(str::to_string),
        }
    }

    fn service(created: AnalysisTask, polled: AnalysisTask) -> AnalysisService {
        build_service(created, polled, false)
    }

    fn build_service(
        created: AnalysisTask,
        polled: AnalysisTask,
        hang_on_create: bool,
    ) -> AnalysisService {
        let tokens = Arc::new(TokenStorage::default());
        tokens.set_access_token(Some("preauthorized".into()));
        let auth = Arc::new(AuthClient::new(
            HttpClient::new(Duration::from_secs(1)).unwrap(),
            Url::parse("http://127.0.0.1:9").unwrap(),
            tokens,
            Arc::new(TokensStore::default()),
        ));
        let api: Arc<dyn AnalysisApi> = Arc::new(CannedApi {
            created: Mutex::new(Some(created)),
            polled,
            hang_on_create,
        });
        let poller = TaskPoller::new(api.clone(), PollerConfig::default());
        AnalysisService::new(auth, api, poller, "debug-test".into())
    }

    fn report() -> AnalysisReport {
        AnalysisReport {
            risk_score: 72,
            red_flags: vec!["asks for gift cards".into()],
            recommendations: vec!["verify identity".into()],
        }
    }

    fn chat() -> Vec<FilePart> {
        vec![FilePart::new("files", "chat.png", vec![0u8; 8])]
    }

    #[tokio::test(start_paused = true)]
    async fn finished_details_become_report() {
        let service = service(
            task(TaskStatus::Queued, None, None),
            task(TaskStatus::Finished, Some(TaskResult::Details(report())), None),
        );
        let got = service
            .analyze(chat(), Some("hi"))
            .await
            .unwrap();
        assert_eq!(got, report());
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_create_skips_polling() {
        let service = service(
            task(TaskStatus::Failed, None, Some("file too large")),
            task(TaskStatus::Finished, Some(TaskResult::Details(report())), None),
        );
        let err = service
            .analyze(chat(), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "file too large");
    }

    #[tokio::test(start_paused = true)]
    async fn outcome_mapping_for_analysis() {
        let message = service(
            task(TaskStatus::Started, None, None),
            task(TaskStatus::Finished, Some(TaskResult::Message("no chat found".into())), None),
        );
        assert!(matches!(
            message.analyze(chat(), None).await,
            Err(ServiceError::Message(text)) if text == "no chat found"
        ));

        let empty = service(
            task(TaskStatus::Queued, None, None),
            task(TaskStatus::Finished, None, None),
        );
        assert!(matches!(
            empty.analyze(chat(), None).await,
            Err(ServiceError::EmptyResult)
        ));

        let failed = service(
            task(TaskStatus::Queued, None, None),
            task(TaskStatus::Failed, None, None),
        );
        assert_eq!(
            failed
                .analyze(chat(), None)
                .await
                .unwrap_err()
                .to_string(),
            "Analysis failed"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn place_returns_message_text() {
        let service = service(
            task(TaskStatus::Queued, None, None),
            task(
                TaskStatus::Finished,
                Some(TaskResult::Message("Old Town, Tallinn".into())),
                None,
            ),
        );
        let place = service
            .identify_place(FilePart::jpeg("file", vec![1, 2, 3]), None)
            .await
            .unwrap();
        assert_eq!(place, "Old Town, Tallinn");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_current_aborts_polling() {
        let service = Arc::new(service(
            task(TaskStatus::Queued, None, None),
            task(TaskStatus::Started, None, None),
        ));
        let running = {
            let service = service.clone();
            tokio::spawn(async move { service.analyze(chat(), None).await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        service.cancel_current();
        assert!(running.await.unwrap().unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_current_unwinds_hung_create() {
        let service = Arc::new(build_service(
            task(TaskStatus::Queued, None, None),
            task(TaskStatus::Finished, None, None),
            true,
        ));
        let running = {
            let service = service.clone();
            tokio::spawn(async move { service.analyze(chat(), None).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        service.cancel_current();
        let outcome = tokio::time::timeout(Duration::from_secs(3600), running)
            .await
            .expect("analyze kept waiting on the create call")
            .unwrap();
        assert!(outcome.unwrap_err().is_cancelled());
    }
}
