//! The migration run as an explicit sequence of stages.

use serde::Serialize;
use std::fmt;
use tracing::info;

use crate::config::MigrationConfig;
use crate::context::MigrationContext;
use crate::error::{MigrationError, MigrationResult};
use crate::graph::{aggregate, GraphModel};
use crate::hierarchy::{classify, HierarchyOverride};
use crate::import::ImportEngine;
use crate::model::{SchemaModel, TableFilter};
use crate::source::{MetadataReader, RowReader};
use crate::stats::StatisticsSnapshot;
use crate::target::GraphWriter;

/// Completed stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    SchemaRead,
    GraphModelBuilt,
    Aggregated,
    TargetSchemaWritten,
    Importing,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaRead => "schema-read",
            Self::GraphModelBuilt => "graph-model-built",
            Self::Aggregated => "aggregated",
            Self::TargetSchemaWritten => "target-schema-written",
            Self::Importing => "importing",
            Self::Done => "done",
        }
    }

    /// Stage that must be complete before this one starts.
    pub fn previous(&self) -> Option<Stage> {
        match self {
            Self::SchemaRead => None,
            Self::GraphModelBuilt => Some(Self::SchemaRead),
            Self::Aggregated => Some(Self::GraphModelBuilt),
            Self::TargetSchemaWritten => Some(Self::Aggregated),
            Self::Importing => Some(Self::TargetSchemaWritten),
            Self::Done => Some(Self::Importing),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives one migration run through its stages.
///
/// Every step requires the previous stage to be complete and fails with
/// [`MigrationError::InvalidStageTransition`] otherwise.
pub struct Migration {
    ctx: MigrationContext,
    filter: TableFilter,
    overrides: Vec<HierarchyOverride>,
    detect_hierarchies: bool,
    stage: Option<Stage>,
    schema: Option<SchemaModel>,
    graph: Option<GraphModel>,
}

impl Migration {
    pub fn new(config: &MigrationConfig, ctx: MigrationContext) -> Self {
        Self {
            ctx,
            filter: config.mapping.table_filter(),
            overrides: config.hierarchies.clone(),
            detect_hierarchies: config.mapping.detect_hierarchies,
            stage: None,
            schema: None,
            graph: None,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }

    pub fn context(&self) -> &MigrationContext {
        &self.ctx
    }

    pub fn schema(&self) -> Option<&SchemaModel> {
        self.schema.as_ref()
    }

    pub fn graph(&self) -> Option<&GraphModel> {
        self.graph.as_ref()
    }

    fn check(&self, next: Stage) -> MigrationResult<()> {
        if self.stage == next.previous() {
            return Ok(());
        }
        Err(MigrationError::InvalidStageTransition {
            from: self.stage.map_or("start", |s| s.as_str()).to_string(),
            to: next.as_str().to_string(),
        })
    }

    fn complete(&mut self, stage: Stage) {
        self.stage = Some(stage);
        self.ctx.stats.set_stage(stage);
        info!(stage = %stage, "Stage complete");
    }

    fn models(&self) -> MigrationResult<(&SchemaModel, &GraphModel)> {
        match (&self.schema, &self.graph) {
            (Some(schema), Some(graph)) => Ok((schema, graph)),
            _ => Err(MigrationError::mapping("schema or graph model missing")),
        }
    }

    /// Read the source catalog and classify hierarchies.
    pub fn read_schema(&mut self, reader: &dyn MetadataReader) -> MigrationResult<&SchemaModel> {
        self.check(Stage::SchemaRead)?;
        let model = SchemaModel::load(reader, &self.filter, &self.ctx.stats)?;
        let model = classify(model, &self.overrides, self.detect_hierarchies, &self.ctx.stats)?;
        self.schema = Some(model);
        self.complete(Stage::SchemaRead);
        self.models_schema()
    }

    fn models_schema(&self) -> MigrationResult<&SchemaModel> {
        self.schema
            .as_ref()
            .ok_or_else(|| MigrationError::mapping("schema model missing"))
    }

    pub fn build_graph_model(&mut self) -> MigrationResult<&GraphModel> {
        self.check(Stage::GraphModelBuilt)?;
        let graph = GraphModel::build(self.models_schema()?, &self.ctx)?;
        self.graph = Some(graph);
        self.complete(Stage::GraphModelBuilt);
        Ok(self.models()?.1)
    }

    /// Collapse junction tables when the strategy asks for it.
    pub fn aggregate(&mut self) -> MigrationResult<&GraphModel> {
        self.check(Stage::Aggregated)?;
        if self.ctx.strategy.aggregates() {
            let (schema, graph) = self.models()?;
            let aggregated = aggregate(graph, schema, &self.ctx.stats);
            self.graph = Some(aggregated);
        }
        self.complete(Stage::Aggregated);
        Ok(self.models()?.1)
    }

    pub async fn write_target_schema(&mut self, writer: &dyn GraphWriter) -> MigrationResult<()> {
        self.check(Stage::TargetSchemaWritten)?;
        let (_, graph) = self.models()?;

        for vertex in graph.vertex_types() {
            writer.create_vertex_type(vertex).await?;
            if vertex.merge_label == vertex.name && !vertex.key.is_empty() {
                writer.create_index(&vertex.name, &vertex.key).await?;
            }
        }
        for edge in graph.edge_types() {
            writer.create_edge_type(edge).await?;
        }

        self.complete(Stage::TargetSchemaWritten);
        Ok(())
    }

    pub async fn import(
        &mut self,
        reader: &dyn RowReader,
        writer: &dyn GraphWriter,
    ) -> MigrationResult<StatisticsSnapshot> {
        self.check(Stage::Importing)?;
        self.stage = Some(Stage::Importing);
        self.ctx.stats.set_stage(Stage::Importing);

        let (schema, graph) = self.models()?;
        ImportEngine::new(schema, graph, &self.ctx).run(reader, writer).await?;

        self.complete(Stage::Done);
        Ok(self.ctx.stats.snapshot())
    }

    /// All stages in order.
    pub async fn run<S>(&mut self, source: &S, writer: &dyn GraphWriter) -> MigrationResult<StatisticsSnapshot>
    where
        S: MetadataReader + RowReader,
    {
        self.read_schema(source)?;
        self.build_graph_model()?;
        self.aggregate()?;
        self.write_target_schema(writer).await?;
        self.import(source, writer).await
    }
}
