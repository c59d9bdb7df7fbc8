//! Orchestration of the ETL stages against one warehouse connection.
//!
//! A run is strictly sequential: load events, load songs, build dimensions,
//! merge the fact. The first failing stage halts the run; stages that
//! committed before it stay committed, and every stage is safe to re-run.

use rusqlite::Connection;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::config::PipelineConfig;
use crate::db::{self, migrations};
use crate::error::{PipelineError, Stage};
use crate::query::{self, StageMarks, TopSong, TopUser};
use crate::staging::{self, JsonFormat, LoadReport, LoadRequest, SourceUri, StagingRelation};
use crate::transform::{DimensionBuilder, DimensionReport, FactMerger, MergeReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingReport {
    pub events: LoadReport,
    pub songs: LoadReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub staging: StagingReport,
    pub dimensions: DimensionReport,
    pub merge: MergeReport,
    pub elapsed: Duration,
}

/// The four facade queries in one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_users: u64,
    pub total_songs: u64,
    pub top_songs: Vec<TopSong>,
    pub top_users: Vec<TopUser>,
}

pub struct Pipeline {
    conn: Connection,
    config: PipelineConfig,
}

impl Pipeline {
    /// Connect to the configured warehouse and bring its schema up to date.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Connectivity`] when the warehouse never
    /// answers, or a `migrate` stage error.
    pub fn connect(config: PipelineConfig) -> Result<Self, PipelineError> {
        let conn = db::open_warehouse(&config.warehouse)?;
        tracing::info!(warehouse = %config.warehouse.path.display(), "connected to warehouse");
        Ok(Self { conn, config })
    }

    /// Wrap an already-open connection, migrating it first.
    ///
    /// # Errors
    ///
    /// Returns a `migrate` stage error if the schema cannot be applied.
    pub fn with_connection(mut conn: Connection, config: PipelineConfig) -> Result<Self, PipelineError> {
        migrations::migrate(&mut conn)
            .map_err(|source| PipelineError::transform(Stage::Migrate, source))?;
        Ok(Self { conn, config })
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    // -----------------------------------------------------------------------
    // Staging
    // -----------------------------------------------------------------------

    /// Build the load request for `relation` from the configured sources.
    ///
    /// # Errors
    ///
    /// Returns a load stage error if the configured source URI is not
    /// loadable.
    pub fn load_request(&self, relation: StagingRelation) -> Result<LoadRequest, PipelineError> {
        let sources = &self.config.sources;
        let (raw, format) = match relation {
            StagingRelation::Events => (
                sources.log_data.as_str(),
                sources
                    .log_jsonpath
                    .clone()
                    .map_or(JsonFormat::Auto, JsonFormat::JsonPaths),
            ),
            StagingRelation::Songs => (sources.song_data.as_str(), JsonFormat::Auto),
        };

        let source = SourceUri::parse(raw).map_err(|source| PipelineError::Load {
            stage: relation.stage(),
            source,
        })?;

        Ok(LoadRequest {
            relation,
            source,
            credential_ref: sources.credential_ref.clone(),
            format,
        })
    }

    /// Run one bulk load.
    ///
    /// # Errors
    ///
    /// Returns the load error tagged with the relation's stage.
    pub fn load(&self, request: &LoadRequest) -> Result<LoadReport, PipelineError> {
        staging::load(&self.conn, request).map_err(|source| {
            tracing::warn!(stage = %request.relation.stage(), error = %source, "staging load failed");
            PipelineError::Load {
                stage: request.relation.stage(),
                source,
            }
        })
    }

    /// Load both staging relations from the configured sources, events first.
    ///
    /// # Errors
    ///
    /// Stops at the first failing load.
    pub fn load_staging(&self) -> Result<StagingReport, PipelineError> {
        let events = self.load(&self.load_request(StagingRelation::Events)?)?;
        let songs = self.load(&self.load_request(StagingRelation::Songs)?)?;
        Ok(StagingReport { events, songs })
    }

    // -----------------------------------------------------------------------
    // Transforms
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns the first failing dimension's stage.
    pub fn build_dimensions(&self) -> Result<DimensionReport, PipelineError> {
        DimensionBuilder::new(&self.conn).build_all()
    }

    /// # Errors
    ///
    /// Returns a `merge:songplays` error; the fact relation is unchanged.
    pub fn merge_fact(&self) -> Result<MergeReport, PipelineError> {
        FactMerger::new(&self.conn).merge()
    }

    /// Full job: load events, load songs, build dimensions, merge the fact.
    ///
    /// # Errors
    ///
    /// Halts at and returns the first failing stage.
    pub fn run(&self) -> Result<RunReport, PipelineError> {
        let start = Instant::now();

        let staging = self.load_staging()?;
        let dimensions = self.build_dimensions()?;
        let merge = self.merge_fact()?;

        let elapsed = start.elapsed();
        tracing::info!(
            events = staging.events.rows,
            songs = staging.songs.rows,
            fact_rows = merge.fact_rows,
            elapsed_ms = elapsed.as_millis(),
            "pipeline run complete"
        );

        Ok(RunReport {
            staging,
            dimensions,
            merge,
            elapsed,
        })
    }

    // -----------------------------------------------------------------------
    // Query facade
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns a `query` stage error.
    pub fn get_total_users(&self) -> Result<u64, PipelineError> {
        query::total_users(&self.conn).map_err(query_error)
    }

    /// # Errors
    ///
    /// Returns a `query` stage error.
    pub fn get_total_songs(&self) -> Result<u64, PipelineError> {
        query::total_songs(&self.conn).map_err(query_error)
    }

    /// # Errors
    ///
    /// Returns a `query` stage error.
    pub fn get_top_songs(&self, n: usize) -> Result<Vec<TopSong>, PipelineError> {
        query::top_songs(&self.conn, n).map_err(query_error)
    }

    /// # Errors
    ///
    /// Returns a `query` stage error.
    pub fn get_top_users(&self, n: usize) -> Result<Vec<TopUser>, PipelineError> {
        query::top_users(&self.conn, n).map_err(query_error)
    }

    /// All four facade queries, ranking `queries.top_n` entries.
    ///
    /// # Errors
    ///
    /// Returns a `query` stage error.
    pub fn summary(&self) -> Result<Summary, PipelineError> {
        self.summary_top(self.config.queries.top_n)
    }

    /// Like [`Pipeline::summary`] with an explicit ranking size.
    ///
    /// # Errors
    ///
    /// Returns a `query` stage error.
    pub fn summary_top(&self, n: usize) -> Result<Summary, PipelineError> {
        Ok(Summary {
            total_users: self.get_total_users()?,
            total_songs: self.get_total_songs()?,
            top_songs: self.get_top_songs(n)?,
            top_users: self.get_top_users(n)?,
        })
    }

    /// # Errors
    ///
    /// Returns a `query` stage error.
    pub fn stage_marks(&self) -> Result<StageMarks, PipelineError> {
        query::stage_marks(&self.conn).map_err(query_error)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Drop every relation and recreate the schema.
    ///
    /// # Errors
    ///
    /// Returns a `migrate` stage error.
    pub fn reset(&mut self) -> Result<(), PipelineError> {
        let version = migrations::reset(&mut self.conn)
            .map_err(|source| PipelineError::transform(Stage::Migrate, source))?;
        tracing::info!(version, "warehouse reset");
        Ok(())
    }

    /// Empty both staging relations, keeping the analytical model.
    ///
    /// # Errors
    ///
    /// Returns a `migrate` stage error.
    pub fn reset_staging(&mut self) -> Result<(), PipelineError> {
        migrations::reset_staging(&mut self.conn)
            .map_err(|source| PipelineError::transform(Stage::Migrate, source))?;
        tracing::info!("staging relations reset");
        Ok(())
    }
}

fn query_error(source: rusqlite::Error) -> PipelineError {
    PipelineError::transform(Stage::Query, source)
}
