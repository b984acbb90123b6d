//! Trigram Search Index (TSI). Atomic rebuild, exact/prefix/contains/
//! Jaccard-scored fuzzy search. Grounded line-for-line on
//! `original_source/core/search_indexer.py`.

use crate::models::PlayerRecord;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Normalize (lowercase, strip non-alphanumerics), pad with one boundary
/// space each side, then take every 3-char window. Empty if the padded
/// string is shorter than 4 chars (i.e. no trigram fits).
pub fn get_trigrams(text: &str) -> HashSet<String> {
    let normalized: String = text.chars().filter(|c| c.is_ascii_alphanumeric()).flat_map(|c| c.to_lowercase()).collect();
    let padded = format!(" {normalized} ");
    if padded.len() < 4 {
        return HashSet::new();
    }
    let chars: Vec<char> = padded.chars().collect();
    (0..chars.len() - 2).map(|i| chars[i..i + 3].iter().collect()).collect()
}

struct IndexData {
    trigram_index: HashMap<String, HashSet<String>>,
    player_data: HashMap<String, PlayerRecord>,
    /// Preserves insertion order for stable tie-breaking (spec §4.4).
    insertion_order: Vec<String>,
}

pub struct SearchIndexer {
    data: RwLock<Option<IndexData>>,
}

impl Default for SearchIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchIndexer {
    pub fn new() -> Self {
        Self { data: RwLock::new(None) }
    }

    pub fn is_ready(&self) -> bool {
        self.data.read().unwrap().is_some()
    }

    /// Builds a new index from scratch and atomically swaps it in. Sticky:
    /// once `is_ready` flips true it stays true across rebuilds.
    pub fn build_index(&self, players: &[PlayerRecord]) {
        let mut trigram_index: HashMap<String, HashSet<String>> = HashMap::new();
        let mut player_data = HashMap::new();
        let mut insertion_order = Vec::with_capacity(players.len());

        for player in players {
            let id = player.name.clone();
            for trigram in get_trigrams(player.handle()) {
                trigram_index.entry(trigram).or_default().insert(id.clone());
            }
            for alias in player.aliases() {
                for trigram in get_trigrams(alias) {
                    trigram_index.entry(trigram).or_default().insert(id.clone());
                }
            }
            insertion_order.push(id.clone());
            player_data.insert(id, player.clone());
        }

        *self.data.write().unwrap() = Some(IndexData { trigram_index, player_data, insertion_order });
    }

    pub fn search(&self, query: &str, limit: usize) -> Vec<(f64, PlayerRecord)> {
        let guard = self.data.read().unwrap();
        let Some(index) = guard.as_ref() else { return vec![] };

        let query_trigrams = get_trigrams(query);
        if query_trigrams.is_empty() {
            return vec![];
        }

        let mut candidate_scores: HashMap<String, u32> = HashMap::new();
        for trigram in &query_trigrams {
            if let Some(ids) = index.trigram_index.get(trigram) {
                for id in ids {
                    *candidate_scores.entry(id.clone()).or_insert(0) += 1;
                }
            }
        }
        if candidate_scores.is_empty() {
            return vec![];
        }

        // Stable order: by insertion order, then take top 50 by overlap.
        let mut candidates: Vec<&String> = index
            .insertion_order
            .iter()
            .filter(|id| candidate_scores.contains_key(*id))
            .collect();
        candidates.sort_by(|a, b| candidate_scores[*b].cmp(&candidate_scores[*a]));
        candidates.truncate(50);

        let query_lower = query.to_lowercase();
        let mut scored: Vec<(f64, PlayerRecord)> = Vec::new();

        for id in candidates {
            let Some(player) = index.player_data.get(id) else { continue };
            let mut names_to_check: Vec<String> = vec![player.handle().to_lowercase()];
            names_to_check.extend(player.aliases().map(|a| a.split('#').next().unwrap_or(a).to_lowercase()));

            let mut max_similarity = 0.0f64;
            for name_part in &names_to_check {
                if name_part.is_empty() {
                    continue;
                }
                let similarity = if *name_part == query_lower {
                    3.0
                } else if name_part.starts_with(&query_lower) {
                    2.0 + (query_lower.len() as f64 / name_part.len() as f64)
                } else if name_part.contains(&query_lower) {
                    1.0 + (query_lower.len() as f64 / name_part.len() as f64)
                } else {
                    let name_trigrams = get_trigrams(name_part);
                    if name_trigrams.is_empty() {
                        0.0
                    } else {
                        let intersection = query_trigrams.intersection(&name_trigrams).count();
                        let union = query_trigrams.union(&name_trigrams).count();
                        if union > 0 { intersection as f64 / union as f64 } else { 0.0 }
                    }
                };
                if similarity > max_similarity {
                    max_similarity = similarity;
                }
            }

            if max_similarity > 0.3 {
                let overlap = candidate_scores[id] as f64;
                let final_score = overlap + max_similarity * 10.0;
                scored.push((final_score, player.clone()));
            }
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        scored.truncate(limit);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(name: &str) -> PlayerRecord {
        PlayerRecord {
            name: name.to_string(),
            steam: None,
            psn: None,
            xbox: None,
            club_tag: None,
            rank: 1,
            score: 100,
            change: None,
            platforms: vec![],
        }
    }

    #[test]
    fn trigrams_require_minimum_length() {
        assert!(get_trigrams("ab").is_empty());
        assert!(!get_trigrams("abc").is_empty());
    }

    #[test]
    fn is_ready_is_sticky_across_rebuilds() {
        let idx = SearchIndexer::new();
        assert!(!idx.is_ready());
        idx.build_index(&[player("Alpha#0001")]);
        assert!(idx.is_ready());
        idx.build_index(&[]);
        assert!(idx.is_ready());
    }

    #[test]
    fn exact_match_scores_highest() {
        let idx = SearchIndexer::new();
        idx.build_index(&[player("Xyz#0007"), player("Xyzzy#1234")]);
        let results = idx.search("xyz", 10);
        assert_eq!(results[0].1.name, "Xyz#0007");
    }

    #[test]
    fn never_returns_similarity_at_or_below_threshold() {
        let idx = SearchIndexer::new();
        idx.build_index(&[player("Alpha#0001"), player("Beta#0002"), player("Gamma#0003")]);
        let results = idx.search("zzz", 10);
        assert!(results.is_empty());
    }

    #[test]
    fn empty_query_trigrams_yield_empty_results() {
        let idx = SearchIndexer::new();
        idx.build_index(&[player("Alpha#0001")]);
        assert!(idx.search("a", 10).is_empty());
    }
}
