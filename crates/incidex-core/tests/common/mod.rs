//! Shared fixtures for incidex-core integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use incidex_core::{EngineConfig, EngineContext, IncidexResult};
use incidex_model::{EmbeddingConfig, EmbeddingModel, ModelError, ModelInfo, ModelResult};

pub const DIMENSION: usize = 64;

/// Model id the fixture config names and [`HashingEmbedder`] reports.
pub const MODEL_ID: &str = "test/hashing-embedder";

/// Deterministic bag-of-words embedder: each alphabetic token is hashed into
/// one of `dimension` buckets, then the vector is L2-normalized.
#[derive(Debug)]
pub struct HashingEmbedder {
    info: ModelInfo,
    fail: Arc<AtomicBool>,
}

impl HashingEmbedder {
    pub fn new(fail: Arc<AtomicBool>) -> Self {
        Self::with_model(MODEL_ID, DIMENSION, fail)
    }

    pub fn with_model(model_id: &str, dimension: usize, fail: Arc<AtomicBool>) -> Self {
        Self {
            info: ModelInfo::new(model_id, dimension, 512),
            fail,
        }
    }

    /// Vector of the default fixture model.
    pub fn vector(text: &str) -> Vec<f32> {
        Self::vector_of(text, DIMENSION)
    }

    pub fn vector_of(text: &str, dimension: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dimension];
        // Constant component keeps token-free text off the zero vector.
        v[0] = 0.1;
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter(|t| !t.is_empty())
        {
            v[bucket(token, dimension)] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / norm).collect()
    }
}

fn bucket(token: &str, dimension: usize) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    1 + (hash % (dimension as u64 - 1)) as usize
}

impl EmbeddingModel for HashingEmbedder {
    fn embed(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ModelError::embedding_failed(
                self.model_id(),
                "simulated inference failure",
            ));
        }
        let dimension = self.dimension();
        Ok(texts.iter().map(|t| Self::vector_of(t, dimension)).collect())
    }

    fn dimension(&self) -> usize {
        self.info.dimension
    }

    fn model_info(&self) -> &ModelInfo {
        &self.info
    }
}

/// Test workspace: a dataset path and an index directory under one temp dir.
pub struct Fixture {
    pub temp: tempfile::TempDir,
    pub fail: Arc<AtomicBool>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            temp: tempfile::TempDir::new().expect("create temp dir"),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.temp.path().join("data").join("incidents.csv")
    }

    pub fn index_path(&self) -> PathBuf {
        self.temp.path().join("index")
    }

    pub fn write_dataset(&self, csv: &str) {
        write_csv(&self.dataset_path(), csv);
    }

    pub fn config(&self) -> EngineConfig {
        let mut config = EngineConfig {
            dataset_path: self.dataset_path(),
            index_path: self.index_path(),
            backend: "simple".to_string(),
            ..Default::default()
        };
        config.embedding.model_id = MODEL_ID.to_string();
        config
    }

    pub fn engine(&self) -> EngineContext {
        self.engine_with(self.config())
    }

    pub fn engine_with(&self, config: EngineConfig) -> EngineContext {
        let fail = Arc::clone(&self.fail);
        EngineContext::with_embedder_factory(
            config,
            Box::new(
                move |_: &EmbeddingConfig| -> IncidexResult<Arc<dyn EmbeddingModel>> {
                    Ok(Arc::new(HashingEmbedder::new(Arc::clone(&fail))))
                },
            ),
        )
    }

    /// Engine whose embedder reports `model_id` with `dimension` outputs.
    pub fn engine_with_model(
        &self,
        config: EngineConfig,
        model_id: &'static str,
        dimension: usize,
    ) -> EngineContext {
        let fail = Arc::clone(&self.fail);
        EngineContext::with_embedder_factory(
            config,
            Box::new(
                move |_: &EmbeddingConfig| -> IncidexResult<Arc<dyn EmbeddingModel>> {
                    Ok(Arc::new(HashingEmbedder::with_model(
                        model_id,
                        dimension,
                        Arc::clone(&fail),
                    )))
                },
            ),
        )
    }

    pub fn set_embedder_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

pub fn write_csv(path: &Path, csv: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create dataset dir");
    }
    fs::write(path, csv).expect("write dataset");
}

pub const HEADER: &str = "report_id,title,severity,category,risk,year,city,country,injury_category,primary_classification,what_happened,why_did_it_happen,causal_factors,lessons_to_prevent";

/// Eight incidents across five locations and three years.
///
/// Record 4 (Brussels, 2023) has a single indexable section, so a
/// Brussels + 2023 question produces a sparse filtered result.
pub fn incidents_csv() -> String {
    let rows = [
        r#"1,valve leak at pump station,major,process safety,1,2023,vancouver,canada,first aid,unsafe condition,"A corroded valve on the discharge line leaked hydrocarbon vapor near the pump station during startup.","The valve was past its inspection interval and corrosion was not detected.","Deferred maintenance and missing isolation checks on the pressure line.","Inspect valves on schedule and verify isolation before opening any pressure line.""#,
        r#"2,forklift reversing near miss,near miss,vehicle,2,2023,vancouver,canada,injury,unsafe act,"A forklift reversed toward a pedestrian walkway while a contractor crew was crossing.","The spotter was absent and the reversing alarm was muted.","Congested loading bay and no marked pedestrian route.","Mark pedestrian routes and require a spotter for every reversing manoeuvre.""#,
        r#"3,hand laceration in workshop,minor,safety,3,2021,vancouver,,first aid,unsafe act,"A technician cut a hand on a sharp sheet metal edge while carrying panels.","Cut resistant gloves were not worn for the task.",,"Issue cut resistant gloves and brief crews on handling sheet metal.""#,
        r#"4,ladder slip in office,serious,safety,2,2023,brussels,belgium,medical treatment,unsafe condition,"An employee slipped from a wet stepladder while replacing a ceiling light fitting.",short,,"#,
        r#"5,chemical splash in lab,serious,process safety,1,2022,,egypt,medical treatment,unsafe act,"Caustic chemical splashed onto a worker during a transfer between drums.","Transfer pump hose was not secured and face shield was not worn.","Improvised transfer setup without a written procedure.","Use secured transfer hoses and mandatory face shields for chemical transfer.""#,
        r#"6,electrical arc during maintenance,major,electrical,1,2023,,chile,lost time,unsafe condition,"An arc flash occurred when a technician opened a live electrical panel.","The panel was not isolated and no energy verification was done.","Lockout procedure skipped under schedule pressure.","Enforce lockout and verify zero energy before opening electrical panels.""#,
        r#"7,confined space entry without permit,potentially significant,safety,1,2021,trinidad tobago,,injury,unsafe act,"A contractor entered a vessel for cleaning before the confined space permit was issued.","The crew assumed the atmosphere test from the prior shift was still valid.","Permit to work process not enforced at shift change.","Reissue confined space permits at every shift change and retest the atmosphere.""#,
        r#"8,home office trip hazard,minor,ergonomics,3,2022,working home,,injury,unsafe condition,"An employee working from home tripped over a loose cable and bruised a knee.","Cables were routed across the walkway in the home office.",,"Provide cable management kits to remote workers.""#,
    ];
    format!("{}\n{}\n", HEADER, rows.join("\n"))
}

/// Record ids of all hits.
pub fn hit_records(result: &incidex_core::RetrievalResult) -> Vec<String> {
    result
        .hits
        .iter()
        .map(|h| h.metadata.report_id.clone())
        .collect()
}
