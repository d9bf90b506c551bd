//! Application context: every collaborator, built once at startup and
//! passed by reference.

use std::sync::Arc;

use tracing::info;

use crate::agents::{AgentMessage, ReactAgent, SqlChain, Toolkit};
use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::db::Database;
use crate::error::AppError;
use crate::llm::{LlmProvider, providers};
use crate::lookup::ProperNounIndex;
use crate::pipeline::QueryPipeline;
use crate::workflow::Dispatcher;

pub struct AppContext {
    pub config: Config,
    pub db: Arc<Database>,
    pub llm: LlmProvider,
    pub lookup: Option<Arc<ProperNounIndex>>,
    pub dispatcher: Dispatcher<SqlChain, ReactAgent>,
    pub pipeline: QueryPipeline,
    pub checkpoints: Option<CheckpointStore>,
}

impl AppContext {
    /// Open the database, construct providers from config, and wire
    /// everything together.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let llm = providers::build(&config.llm, config.llm_api_key.clone())?;
        let embedder = providers::build_embedder(&config.embeddings, config.llm_api_key.clone())?;
        let db = Arc::new(Database::open(&config.database)?);
        Self::assemble(config, db, llm, embedder).await
    }

    /// Wire the context from already-constructed parts.
    pub async fn assemble(
        config: Config,
        db: Arc<Database>,
        llm: LlmProvider,
        embedder: LlmProvider,
    ) -> Result<Self, AppError> {
        let lookup = if config.lookup.enabled {
            let model_key = format!("{}:{}", embedder.name(), config.embeddings.openai.model);
            let index = ProperNounIndex::build(
                &db,
                &config.lookup.sources,
                embedder,
                &model_key,
                &config.lookup_index_path(),
            )
            .await?;
            info!(names = index.len(), "proper-noun index ready");
            Some(Arc::new(index))
        } else {
            None
        };

        let toolkit = Toolkit::new(
            db.clone(),
            llm.clone(),
            lookup.clone(),
            config.lookup.top_k,
            &config.prompts_dir,
        );
        let agent = ReactAgent::new(
            llm.clone(),
            toolkit,
            &config.prompts_dir,
            config.agent.top_k,
            config.agent.max_steps,
        )?;
        let chain = SqlChain::new(llm.clone(), db.clone(), config.chain.top_k, &config.prompts_dir);
        let pipeline = QueryPipeline::new(llm.clone(), db.clone(), config.chain.top_k, &config.prompts_dir);

        let checkpoints = if config.checkpoint.enabled {
            Some(CheckpointStore::open(&config.checkpoint_dir())?)
        } else {
            None
        };

        info!(
            llm = llm.name(),
            lookup = lookup.is_some(),
            checkpoints = checkpoints.is_some(),
            "app context ready"
        );

        Ok(Self {
            dispatcher: Dispatcher::new(chain, agent),
            config,
            db,
            llm,
            lookup,
            pipeline,
            checkpoints,
        })
    }

    /// Forward every general-path agent turn to `f`.
    pub fn with_turn_observer(mut self, f: impl Fn(&AgentMessage) + Send + Sync + 'static) -> Self {
        self.dispatcher = self.dispatcher.with_turn_observer(f);
        self
    }
}
