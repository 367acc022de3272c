use std::sync::Arc;
use dashmap::DashMap;
use tokio::task::AbortHandle;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::conversations::actions::{ActionHandler, AdvisoryChatHandler, AgencyHandoffHandler, RetrievalLookupHandler};
use crate::conversations::{AgencyDirectory, ClarificationGate, IntentClassifier, ResponseRouter};
use crate::forms::{FormFieldExtractionPipeline, FormFillPipeline, FormSchemaService, FormStore, HttpFormStore, InMemoryFormStore};
use crate::llm::{CompletionFactory, CompletionInterface};
use crate::retrieval::{HttpRetrievalService, RetrievalService};

/// Pipelines built once at startup and shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub router: Arc<ResponseRouter>,
    pub extraction: Arc<FormFieldExtractionPipeline>,
    pub fill: Arc<FormFillPipeline>,
    pub schemas: Arc<FormSchemaService>,
    pub directory: Arc<AgencyDirectory>,
    pub retrieval: Arc<dyn RetrievalService>,
    /// In-flight websocket turns by client uid.
    pub conversation_tasks: Arc<DashMap<String, AbortHandle>>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let completion = CompletionFactory::create_client(&config.llm_config)?;
        let retrieval: Arc<dyn RetrievalService> = Arc::new(HttpRetrievalService::new(&config.retrieval_config)?);
        let store: Arc<dyn FormStore> = match &config.form_store_config {
            Some(store_config) => Arc::new(HttpFormStore::new(store_config)?),
            None => {
                info!("No form store configured, using an in-memory store");
                Arc::new(InMemoryFormStore::new())
            }
        };
        Ok(Self::with_collaborators(config, completion, retrieval, store))
    }

    pub fn with_collaborators(
        config: Config,
        completion: Arc<dyn CompletionInterface>,
        retrieval: Arc<dyn RetrievalService>,
        store: Arc<dyn FormStore>,
    ) -> Self {
        let pipeline = &config.pipeline_config;
        let top_k = config.retrieval_config.top_k;
        let directory = Arc::new(AgencyDirectory::builtin());

        let advisory = Arc::new(AdvisoryChatHandler::new(completion.clone(), pipeline.advisory, pipeline.narration));
        let handlers: Vec<Arc<dyn ActionHandler>> = vec![
            Arc::new(RetrievalLookupHandler::documents(retrieval.clone(), advisory.clone(), top_k)),
            Arc::new(RetrievalLookupHandler::forms(retrieval.clone(), advisory.clone(), top_k)),
            Arc::new(AgencyHandoffHandler::new(completion.clone(), directory.clone(), pipeline.agency)),
        ];
        let router = ResponseRouter::new(
            IntentClassifier::new(completion.clone(), directory.clone(), pipeline.intent),
            ClarificationGate::new(completion.clone(), pipeline.clarification),
            advisory,
            handlers,
            pipeline.max_clarification_turns,
        );

        let extraction = Arc::new(FormFieldExtractionPipeline::new(completion.clone(), pipeline.extraction));
        let fill = Arc::new(FormFillPipeline::new(completion, pipeline));
        let schemas = Arc::new(FormSchemaService::new(store, extraction.clone()));

        Self {
            router: Arc::new(router),
            extraction,
            fill,
            schemas,
            directory,
            retrieval,
            conversation_tasks: Arc::new(DashMap::new()),
            config: Arc::new(config),
        }
    }

    pub fn generate_client_uid(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
