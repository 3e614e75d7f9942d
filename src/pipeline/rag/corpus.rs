//! Specialty-partitioned corpus.
//!
//! On disk each specialty is a sub-directory of the corpus root holding a
//! `passages.jsonl` file, one [`Passage`] per line with its precomputed
//! embedding. Partitions are loaded lazily and cached for the process
//! lifetime.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::types::{Passage, ScoredPassage, VectorSearch};
use super::RagError;

/// File name of a partition inside its specialty directory.
pub const PARTITION_FILE: &str = "passages.jsonl";

/// Resolves a specialty tag to its searchable partition.
pub trait PartitionSource: Send + Sync {
    /// Specialty tags with a partition, lower-case and sorted.
    fn specialties(&self) -> Vec<String>;

    fn partition(&self, specialty: &str) -> Result<Arc<dyn VectorSearch>, RagError>;
}

// ═══════════════════════════════════════════════════════════
// In-memory vector search
// ═══════════════════════════════════════════════════════════

/// Brute-force cosine-similarity search over a passage list.
pub struct InMemoryVectorSearch {
    passages: Vec<Passage>,
    dimension: Option<usize>,
}

impl InMemoryVectorSearch {
    pub fn new() -> Self {
        Self {
            passages: Vec::new(),
            dimension: None,
        }
    }

    pub fn from_passages(passages: Vec<Passage>) -> Result<Self, RagError> {
        let mut store = Self::new();
        for p in passages {
            store.add(p)?;
        }
        Ok(store)
    }

    /// Add a passage. All passages in a partition share one dimension.
    pub fn add(&mut self, passage: Passage) -> Result<(), RagError> {
        match self.dimension {
            Some(dim) if dim != passage.embedding.len() => {
                return Err(RagError::DimensionMismatch {
                    query: passage.embedding.len(),
                    corpus: dim,
                });
            }
            None => self.dimension = Some(passage.embedding.len()),
            _ => {}
        }
        self.passages.push(passage);
        Ok(())
    }
}

impl Default for InMemoryVectorSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorSearch for InMemoryVectorSearch {
    fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>, RagError> {
        if let Some(dim) = self.dimension {
            if dim != query_embedding.len() {
                return Err(RagError::DimensionMismatch {
                    query: query_embedding.len(),
                    corpus: dim,
                });
            }
        }

        let mut scored: Vec<(f32, &Passage)> = self
            .passages
            .iter()
            .map(|p| (cosine_similarity(query_embedding, &p.embedding), p))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, p)| ScoredPassage {
                passage_id: p.id.clone(),
                source: p.source.clone(),
                text: p.text.clone(),
                score,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.passages.len()
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

// ═══════════════════════════════════════════════════════════
// On-disk corpus
// ═══════════════════════════════════════════════════════════

/// Specialty directories under `root` that contain a partition file.
pub fn discover_specialties(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = discover_partitions(root).into_keys().collect();
    names.sort();
    names
}

/// Lower-cased specialty tag to partition file path.
fn discover_partitions(root: &Path) -> HashMap<String, PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(dir = %root.display(), error = %e, "Corpus directory not readable");
            return HashMap::new();
        }
    };

    entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            let file = e.path().join(PARTITION_FILE);
            (!name.starts_with('.') && file.is_file()).then(|| (name.to_lowercase(), file))
        })
        .collect()
}

/// Read one partition file.
pub fn load_partition(path: &Path, specialty: &str) -> Result<InMemoryVectorSearch, RagError> {
    let file = File::open(path).map_err(|e| RagError::PartitionLoad {
        specialty: specialty.to_string(),
        reason: e.to_string(),
    })?;

    let mut store = InMemoryVectorSearch::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| RagError::PartitionLoad {
            specialty: specialty.to_string(),
            reason: e.to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let passage: Passage = serde_json::from_str(&line).map_err(|e| RagError::PartitionLoad {
            specialty: specialty.to_string(),
            reason: format!("line {}: {e}", idx + 1),
        })?;
        store.add(passage)?;
    }
    Ok(store)
}

/// Corpus rooted at a directory, one sub-directory per specialty.
pub struct FileCorpus {
    root: PathBuf,
    partitions: HashMap<String, PathBuf>,
    loaded: RwLock<HashMap<String, Arc<InMemoryVectorSearch>>>,
}

impl FileCorpus {
    pub fn open(root: &Path) -> Self {
        let partitions = discover_partitions(root);
        if partitions.is_empty() {
            tracing::warn!(dir = %root.display(), "No corpus partitions found");
        } else {
            tracing::info!(dir = %root.display(), count = partitions.len(), "Corpus partitions discovered");
        }
        Self {
            root: root.to_path_buf(),
            partitions,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PartitionSource for FileCorpus {
    fn specialties(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.keys().cloned().collect();
        names.sort();
        names
    }

    fn partition(&self, specialty: &str) -> Result<Arc<dyn VectorSearch>, RagError> {
        let key = specialty.trim().to_lowercase();
        let Some(path) = self.partitions.get(&key) else {
            return Err(RagError::PartitionMissing(key));
        };

        if let Some(hit) = self
            .loaded
            .read()
            .map_err(|_| RagError::VectorSearch("Corpus cache lock poisoned".into()))?
            .get(&key)
        {
            return Ok(hit.clone() as Arc<dyn VectorSearch>);
        }

        if !path.is_file() {
            return Err(RagError::PartitionMissing(key));
        }
        let store = Arc::new(load_partition(path, &key)?);
        tracing::info!(specialty = %key, passages = store.len(), "Corpus partition loaded");

        let mut cache = self
            .loaded
            .write()
            .map_err(|_| RagError::VectorSearch("Corpus cache lock poisoned".into()))?;
        let entry = cache.entry(key).or_insert(store);
        Ok(entry.clone() as Arc<dyn VectorSearch>)
    }
}

/// Corpus built in memory, for tests and embedding callers.
#[derive(Default)]
pub struct InMemoryCorpus {
    partitions: HashMap<String, Arc<InMemoryVectorSearch>>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partition(mut self, specialty: &str, store: InMemoryVectorSearch) -> Self {
        self.partitions
            .insert(specialty.to_lowercase(), Arc::new(store));
        self
    }
}

impl PartitionSource for InMemoryCorpus {
    fn specialties(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.keys().cloned().collect();
        names.sort();
        names
    }

    fn partition(&self, specialty: &str) -> Result<Arc<dyn VectorSearch>, RagError> {
        let key = specialty.trim().to_lowercase();
        self.partitions
            .get(&key)
            .map(|p| p.clone() as Arc<dyn VectorSearch>)
            .ok_or(RagError::PartitionMissing(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn passage(id: &str, source: &str, embedding: Vec<f32>) -> Passage {
        Passage {
            id: id.into(),
            source: source.into(),
            text: format!("text of {id}"),
            embedding,
        }
    }

    fn write_partition(root: &Path, specialty: &str, passages: &[Passage]) {
        let dir = root.join(specialty);
        std::fs::create_dir_all(&dir).unwrap();
        let mut f = File::create(dir.join(PARTITION_FILE)).unwrap();
        for p in passages {
            writeln!(f, "{}", serde_json::to_string(p).unwrap()).unwrap();
        }
    }

    #[test]
    fn cosine_similarity_identical_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!((sim - 1.0).abs() < 0.01);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 0.01);
    }

    #[test]
    fn in_memory_search_returns_top_k() {
        let store = InMemoryVectorSearch::from_passages(vec![
            passage("c1", "asthma.pdf", vec![1.0, 0.0, 0.0]),
            passage("c2", "copd.pdf", vec![0.8, 0.6, 0.0]),
            passage("c3", "flu.pdf", vec![0.0, 1.0, 0.0]),
        ])
        .unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].passage_id, "c1");
        assert_eq!(results[1].passage_id, "c2");
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let mut store = InMemoryVectorSearch::new();
        store.add(passage("a", "s", vec![1.0, 0.0])).unwrap();
        assert!(matches!(
            store.add(passage("b", "s", vec![1.0, 0.0, 0.0])),
            Err(RagError::DimensionMismatch { .. })
        ));
        assert!(store.search(&[1.0], 1).is_err());
    }

    #[test]
    fn discovers_only_directories_with_partition_file() {
        let tmp = tempfile::tempdir().unwrap();
        write_partition(tmp.path(), "Cardiologo", &[passage("p", "s", vec![1.0])]);
        write_partition(tmp.path(), "allergologo", &[passage("p", "s", vec![1.0])]);
        std::fs::create_dir_all(tmp.path().join("empty_dir")).unwrap();
        std::fs::create_dir_all(tmp.path().join(".hidden")).unwrap();

        assert_eq!(discover_specialties(tmp.path()), vec!["allergologo", "cardiologo"]);
    }

    #[test]
    fn missing_root_discovers_nothing() {
        assert!(discover_specialties(Path::new("/nonexistent/triage/corpus")).is_empty());
    }

    #[test]
    fn file_corpus_loads_and_caches_partition() {
        let tmp = tempfile::tempdir().unwrap();
        write_partition(
            tmp.path(),
            "gastroenterologo",
            &[
                passage("g1", "gerd.pdf", vec![1.0, 0.0]),
                passage("g2", "ulcer.pdf", vec![0.0, 1.0]),
            ],
        );
        let corpus = FileCorpus::open(tmp.path());
        let p1 = corpus.partition("Gastroenterologo").unwrap();
        assert_eq!(p1.len(), 2);
        let p2 = corpus.partition("gastroenterologo").unwrap();
        assert!(Arc::ptr_eq(&p1, &p2));
        assert_eq!(corpus.specialties(), vec!["gastroenterologo"]);
    }

    #[test]
    fn file_corpus_resolves_mixed_case_directories() {
        let tmp = tempfile::tempdir().unwrap();
        write_partition(tmp.path(), "Cardiologo", &[passage("c", "s", vec![1.0])]);
        let corpus = FileCorpus::open(tmp.path());
        assert_eq!(corpus.partition("cardiologo").unwrap().len(), 1);
    }

    #[test]
    fn file_corpus_missing_partition_is_explicit_error() {
        let tmp = tempfile::tempdir().unwrap();
        let corpus = FileCorpus::open(tmp.path());
        assert!(matches!(
            corpus.partition("dermatologo"),
            Err(RagError::PartitionMissing(_))
        ));
    }

    #[test]
    fn corrupt_partition_line_is_load_error() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("cardiologo");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(PARTITION_FILE), "{not json}\n").unwrap();
        let corpus = FileCorpus::open(tmp.path());
        assert!(matches!(
            corpus.partition("cardiologo"),
            Err(RagError::PartitionLoad { .. })
        ));
    }

    #[test]
    fn in_memory_corpus_lists_specialties() {
        let corpus = InMemoryCorpus::new()
            .with_partition("Cardiologo", InMemoryVectorSearch::new())
            .with_partition("allergologo", InMemoryVectorSearch::new());
        assert_eq!(corpus.specialties(), vec!["allergologo", "cardiologo"]);
        assert!(corpus.partition("CARDIOLOGO").is_ok());
        assert!(corpus.partition("neurologo").is_err());
    }
}
