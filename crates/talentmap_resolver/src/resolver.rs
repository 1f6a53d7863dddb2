//! Three-stage field resolver.
//!
//! Stage A: deterministic matching (exact name, alias, substring,
//! stem overlap). Stage B: embedding similarity with a margin rule.
//! Stage C: edit-distance fallback. Targets are claimed exactly once;
//! a later stage never displaces an earlier commitment.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Once;

use talentmap_protocol::{
    Alternative, CancellationToken, Mapping, MatchMethod, PipelineError, PipelineResult,
    ResolutionReport,
};
use talentmap_schema::{
    lcs_ratio, normalize, stem_jaccard, word_components, EntityAliases, EntitySchema,
    DISCRIMINATING_STEMS,
};

use crate::embedding::index::EmbeddingIndex;
use crate::embedding::TextEmbedder;

/// Stage A commits at or above this confidence.
const STAGE_A_THRESHOLD: f64 = 0.85;
/// Substring containment only counts when lengths are comparable.
const SUBSTRING_MIN_LEN_RATIO: f64 = 0.6;
/// Confidence granted by the stem-overlap rule (never commits on its own).
const STEM_OVERLAP_CONFIDENCE: f64 = 0.82;
/// Stage B winner must beat the runner-up by this much confidence.
const SEMANTIC_MARGIN: f64 = 0.03;
/// Stage B ignores similarities below this floor; cosine noise between
/// unrelated field names must not manufacture mappings.
const SEMANTIC_SIM_FLOOR: f32 = 0.35;
/// Upper edge of the fuzzy confidence band.
const FUZZY_CONF_CEILING: f64 = 0.84;
/// At most this many alternatives ride along with a committed mapping.
const MAX_ALTERNATIVES: usize = 3;

static DEGRADED_MODE_LOGGED: Once = Once::new();

/// One scored `(target, confidence, method)` candidate during a stage.
#[derive(Debug, Clone)]
struct Candidate {
    target: String,
    confidence: f64,
    method: MatchMethod,
    required: bool,
}

/// Arbitration order: higher confidence, then required targets, then
/// lexicographic target name.
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.required.cmp(&a.required))
        .then_with(|| a.target.cmp(&b.target))
}

fn to_alternatives(candidates: &[Candidate], winner: &str) -> Vec<Alternative> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter(|c| c.target != winner && seen.insert(c.target.clone()))
        .take(MAX_ALTERNATIVES)
        .map(|c| Alternative {
            target: c.target.clone(),
            confidence: c.confidence,
            method: c.method,
        })
        .collect()
}

/// Resolves a source column list against one entity schema.
pub struct FieldResolver<'a> {
    schema: &'a EntitySchema,
    aliases: &'a EntityAliases,
    semantic: Option<(&'a EmbeddingIndex, &'a dyn TextEmbedder)>,
}

impl<'a> FieldResolver<'a> {
    pub fn new(
        schema: &'a EntitySchema,
        aliases: &'a EntityAliases,
        semantic: Option<(&'a EmbeddingIndex, &'a dyn TextEmbedder)>,
    ) -> Self {
        Self {
            schema,
            aliases,
            semantic,
        }
    }

    /// Run all three stages and assemble the report.
    pub fn resolve(
        &self,
        source_columns: &[String],
        min_confidence: f64,
        cancel: &CancellationToken,
    ) -> PipelineResult<ResolutionReport> {
        let mut claimed: HashSet<String> = HashSet::new();
        // Committed mapping per source index; emitted in source order.
        let mut committed: BTreeMap<usize, Mapping> = BTreeMap::new();
        let mut diagnostics = Vec::new();

        // Stage A: deterministic matching.
        for (idx, source) in source_columns.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let candidates = self.stage_a_candidates(source, &claimed);
            if let Some(best) = candidates.first() {
                if best.confidence >= STAGE_A_THRESHOLD {
                    claimed.insert(best.target.clone());
                    committed.insert(
                        idx,
                        Mapping {
                            source: source.clone(),
                            target: best.target.clone(),
                            confidence: best.confidence,
                            method: best.method,
                            alternatives: to_alternatives(&candidates, &best.target),
                        },
                    );
                }
            }
        }

        // Stage B: embedding similarity over whatever is left.
        match self.semantic {
            Some((index, embedder)) => {
                self.stage_b(
                    source_columns,
                    index,
                    embedder,
                    min_confidence,
                    &mut claimed,
                    &mut committed,
                    cancel,
                )?;
            }
            None => {
                DEGRADED_MODE_LOGGED.call_once(|| {
                    tracing::warn!(
                        entity = %self.schema.name,
                        "embedding index unavailable; resolver running in degraded mode (stages A+C only)"
                    );
                });
                diagnostics.push(
                    "embedding index unavailable; semantic stage skipped".to_string(),
                );
            }
        }

        // Stage C: fuzzy fallback.
        for (idx, source) in source_columns.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            if committed.contains_key(&idx) {
                continue;
            }
            let ns = normalize(source);
            let mut candidates: Vec<Candidate> = self
                .schema
                .fields
                .iter()
                .filter(|f| !claimed.contains(&f.name))
                .map(|f| Candidate {
                    target: f.name.clone(),
                    confidence: lcs_ratio(&ns, &normalize(&f.name)),
                    method: MatchMethod::Fuzzy,
                    required: f.required,
                })
                .collect();
            candidates.sort_by(rank);
            if let Some(best) = candidates.first() {
                if best.confidence >= min_confidence {
                    claimed.insert(best.target.clone());
                    committed.insert(
                        idx,
                        Mapping {
                            source: source.clone(),
                            target: best.target.clone(),
                            confidence: best.confidence.min(FUZZY_CONF_CEILING),
                            method: MatchMethod::Fuzzy,
                            alternatives: to_alternatives(&candidates, &best.target),
                        },
                    );
                }
            }
        }

        Ok(self.assemble(source_columns, committed, claimed, diagnostics))
    }

    /// Per-target scoring for stage A: first rule that fires wins.
    fn stage_a_candidates(&self, source: &str, claimed: &HashSet<String>) -> Vec<Candidate> {
        let ns = normalize(source);
        let source_stems = word_components(source);
        let alias_target = self.aliases.lookup_alias(&ns);

        let mut candidates = Vec::new();
        for field in &self.schema.fields {
            if claimed.contains(&field.name) {
                continue;
            }
            let nt = normalize(&field.name);

            let scored = if !ns.is_empty() && ns == nt {
                Some((1.0, MatchMethod::Exact))
            } else if alias_target == Some(field.name.as_str()) {
                Some((0.95, MatchMethod::Alias))
            } else if let Some(ratio) = containment_ratio(&ns, &nt) {
                Some((0.85 + 0.05 * ratio, MatchMethod::Partial))
            } else {
                let target_stems = word_components(&field.name);
                let has_anchor = source_stems
                    .intersection(&target_stems)
                    .any(|stem| DISCRIMINATING_STEMS.contains(stem));
                if has_anchor && stem_jaccard(&source_stems, &target_stems) >= 0.5 {
                    Some((STEM_OVERLAP_CONFIDENCE, MatchMethod::Partial))
                } else {
                    None
                }
            };

            if let Some((confidence, method)) = scored {
                candidates.push(Candidate {
                    target: field.name.clone(),
                    confidence,
                    method,
                    required: field.required,
                });
            }
        }
        candidates.sort_by(rank);
        candidates
    }

    #[allow(clippy::too_many_arguments)]
    fn stage_b(
        &self,
        source_columns: &[String],
        index: &EmbeddingIndex,
        embedder: &dyn TextEmbedder,
        min_confidence: f64,
        claimed: &mut HashSet<String>,
        committed: &mut BTreeMap<usize, Mapping>,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let remaining: Vec<(usize, &String)> = source_columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| !committed.contains_key(idx))
            .collect();
        if remaining.is_empty() {
            return Ok(());
        }

        let queries: Vec<String> = remaining.iter().map(|(_, s)| (*s).clone()).collect();
        let ranked_per_query = match index.query_batch(embedder, &queries) {
            Ok(r) => r,
            Err(err) => {
                // Degrade rather than fail the whole resolution.
                DEGRADED_MODE_LOGGED.call_once(|| {
                    tracing::warn!(%err, "embedding query failed; resolver falling back to stages A+C");
                });
                return Ok(());
            }
        };

        for ((idx, source), ranked) in remaining.into_iter().zip(ranked_per_query) {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let Some((top_target, top_sim)) = ranked.first().cloned() else {
                continue;
            };
            if top_sim < SEMANTIC_SIM_FLOOR {
                continue;
            }
            let top_conf = semantic_confidence(top_sim);
            let runner_up_conf = ranked
                .get(1)
                .map(|(_, sim)| semantic_confidence(*sim))
                .unwrap_or(0.0);
            // The margin rule: an ambiguous winner is no winner.
            if top_conf - runner_up_conf < SEMANTIC_MARGIN {
                continue;
            }
            if claimed.contains(&top_target) || top_conf < min_confidence {
                continue;
            }

            let alternatives: Vec<Alternative> = ranked
                .iter()
                .skip(1)
                .take(MAX_ALTERNATIVES)
                .map(|(target, sim)| Alternative {
                    target: target.clone(),
                    confidence: semantic_confidence(*sim),
                    method: MatchMethod::Semantic,
                })
                .collect();

            claimed.insert(top_target.clone());
            committed.insert(
                idx,
                Mapping {
                    source: source.clone(),
                    target: top_target,
                    confidence: top_conf,
                    method: MatchMethod::Semantic,
                    alternatives,
                },
            );
        }
        Ok(())
    }

    fn assemble(
        &self,
        source_columns: &[String],
        committed: BTreeMap<usize, Mapping>,
        claimed: HashSet<String>,
        diagnostics: Vec<String>,
    ) -> ResolutionReport {
        let unmapped_sources: Vec<String> = source_columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| !committed.contains_key(idx))
            .map(|(_, s)| s.clone())
            .collect();
        let unmapped_targets: Vec<String> = self
            .schema
            .fields
            .iter()
            .filter(|f| !claimed.contains(&f.name))
            .map(|f| f.name.clone())
            .collect();

        let mut method_counts: BTreeMap<MatchMethod, usize> = BTreeMap::new();
        for mapping in committed.values() {
            *method_counts.entry(mapping.method).or_insert(0) += 1;
        }

        let mapping_percentage = if source_columns.is_empty() {
            0.0
        } else {
            committed.len() as f64 / source_columns.len() as f64 * 100.0
        };

        ResolutionReport {
            entity: self.schema.name.clone(),
            mappings: committed.into_values().collect(),
            unmapped_sources,
            unmapped_targets,
            mapping_percentage,
            method_counts,
            diagnostics,
        }
    }
}

fn semantic_confidence(similarity: f32) -> f64 {
    0.70 + 0.15 * f64::from(similarity.clamp(0.0, 1.0))
}

/// Substring containment with a length-ratio guard. Returns the
/// `min/max` length ratio when one normalized name contains the other
/// and the shorter is at least 60% of the longer.
fn containment_ratio(a: &str, b: &str) -> Option<f64> {
    if a.is_empty() || b.is_empty() || a == b {
        return None;
    }
    if !a.contains(b) && !b.contains(a) {
        return None;
    }
    let (short, long) = if a.len() < b.len() { (a, b) } else { (b, a) };
    let ratio = short.len() as f64 / long.len() as f64;
    (ratio >= SUBSTRING_MIN_LEN_RATIO).then_some(ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use talentmap_schema::{AliasDictionary, SchemaRegistry};

    fn fixtures() -> (SchemaRegistry, AliasDictionary) {
        let registry = SchemaRegistry::builtin().unwrap();
        let aliases = AliasDictionary::builtin(&registry).unwrap();
        (registry, aliases)
    }

    fn resolve_degraded(
        entity: &str,
        columns: &[&str],
        registry: &SchemaRegistry,
        aliases: &AliasDictionary,
    ) -> ResolutionReport {
        let schema = registry.get(entity).unwrap();
        let entity_aliases = aliases.for_entity(&schema.name);
        let resolver = FieldResolver::new(schema, &entity_aliases, None);
        let columns: Vec<String> = columns.iter().map(|s| s.to_string()).collect();
        resolver
            .resolve(&columns, 0.70, &CancellationToken::new())
            .unwrap()
    }

    #[test]
    fn exact_match_has_full_confidence() {
        let (registry, aliases) = fixtures();
        let report = resolve_degraded("employee", &["EMPLOYEE_ID"], &registry, &aliases);
        assert_eq!(report.mappings.len(), 1);
        let m = &report.mappings[0];
        assert_eq!(m.target, "EMPLOYEE_ID");
        assert_eq!(m.confidence, 1.0);
        assert_eq!(m.method, MatchMethod::Exact);
    }

    #[test]
    fn alias_hit_wins_at_alias_confidence() {
        let (registry, aliases) = fixtures();
        let report = resolve_degraded("candidate", &["PersonID"], &registry, &aliases);
        let m = &report.mappings[0];
        assert_eq!(m.target, "CANDIDATE_ID");
        assert_eq!(m.confidence, 0.95);
        assert_eq!(m.method, MatchMethod::Alias);
    }

    #[test]
    fn siemens_candidate_headers_resolve_as_expected() {
        let (registry, aliases) = fixtures();
        let report = resolve_degraded(
            "candidate",
            &[
                "PersonID",
                "FirstName",
                "LastName",
                "WorkEmails",
                "HomeEmails",
                "WorkPhones",
                "LastActivityTimeStamp",
            ],
            &registry,
            &aliases,
        );

        let expect = [
            ("PersonID", "CANDIDATE_ID", 0.95, MatchMethod::Alias),
            ("FirstName", "FIRST_NAME", 1.0, MatchMethod::Exact),
            ("LastName", "LAST_NAME", 1.0, MatchMethod::Exact),
            ("WorkEmails", "EMAIL", 0.95, MatchMethod::Alias),
            ("WorkPhones", "PHONE", 0.95, MatchMethod::Alias),
            (
                "LastActivityTimeStamp",
                "LAST_ACTIVITY_TS",
                0.95,
                MatchMethod::Alias,
            ),
        ];
        for (source, target, confidence, method) in expect {
            let m = report
                .mapping_for_source(source)
                .unwrap_or_else(|| panic!("{source} must be mapped"));
            assert_eq!(m.target, target, "{source}");
            assert_eq!(m.confidence, confidence, "{source}");
            assert_eq!(m.method, method, "{source}");
        }

        // HomeEmails loses the EMAIL collision: first committed wins.
        assert!(report.unmapped_sources.contains(&"HomeEmails".to_string()));
        assert!(report.mapping_percentage >= 75.0);
    }

    #[test]
    fn no_two_mappings_share_a_target() {
        let (registry, aliases) = fixtures();
        let report = resolve_degraded(
            "employee",
            &["WorkEmails", "HomeEmails", "Work Email", "EmployeeID"],
            &registry,
            &aliases,
        );
        let mut targets = HashSet::new();
        for m in &report.mappings {
            assert!(targets.insert(m.target.clone()), "duplicate target {}", m.target);
        }
    }

    #[test]
    fn confidence_stays_in_method_band() {
        let (registry, aliases) = fixtures();
        let registry_entities = ["employee", "candidate", "position"];
        let columns = [
            "EMPLOYEE_ID",
            "PersonID",
            "FirstNme",
            "Requisition ID",
            "WorkEmails",
            "HireDt",
            "EmployeType",
        ];
        for entity in registry_entities {
            let report = resolve_degraded(
                entity,
                &columns,
                &registry,
                &aliases,
            );
            for m in &report.mappings {
                match m.method {
                    MatchMethod::Exact => assert_eq!(m.confidence, 1.0),
                    MatchMethod::Alias => assert_eq!(m.confidence, 0.95),
                    MatchMethod::Partial => {
                        assert!((0.85..0.95).contains(&m.confidence), "{:?}", m)
                    }
                    MatchMethod::Semantic => {
                        assert!((0.70..=0.85).contains(&m.confidence), "{:?}", m)
                    }
                    MatchMethod::Fuzzy => {
                        assert!((0.70..=0.84).contains(&m.confidence), "{:?}", m)
                    }
                }
            }
        }
    }

    #[test]
    fn typo_recovers_through_fuzzy_stage() {
        let (registry, aliases) = fixtures();
        let report = resolve_degraded("employee", &["FirstNme"], &registry, &aliases);
        let m = report.mapping_for_source("FirstNme").expect("mapped");
        assert_eq!(m.target, "FIRST_NAME");
        assert_eq!(m.method, MatchMethod::Fuzzy);
        assert!(m.confidence >= 0.70 && m.confidence <= 0.84);
    }

    #[test]
    fn unrelated_column_stays_unmapped() {
        let (registry, aliases) = fixtures();
        let report = resolve_degraded("employee", &["FavouriteColor"], &registry, &aliases);
        assert!(report.mappings.is_empty());
        assert_eq!(report.unmapped_sources, vec!["FavouriteColor".to_string()]);
        assert_eq!(report.mapping_percentage, 0.0);
    }

    #[test]
    fn resolution_is_deterministic() {
        let (registry, aliases) = fixtures();
        let columns = ["PersonID", "WorkEmails", "HomeEmails", "Given Name"];
        let a = resolve_degraded("candidate", &columns, &registry, &aliases);
        let b = resolve_degraded("candidate", &columns, &registry, &aliases);
        assert_eq!(a, b);
    }

    #[test]
    fn semantic_stage_respects_claims_and_margin() {
        let (registry, aliases) = fixtures();
        let schema = registry.get("candidate").unwrap();
        let entity_aliases = aliases.for_entity(&schema.name);
        let embedder = HashEmbedder::new();
        let index =
            crate::embedding::index::EmbeddingIndex::build(schema, &entity_aliases, &embedder)
                .unwrap();
        let resolver = FieldResolver::new(schema, &entity_aliases, Some((&index, &embedder)));

        let columns: Vec<String> = ["WorkEmails", "HomeEmails"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let report = resolver
            .resolve(&columns, 0.70, &CancellationToken::new())
            .unwrap();

        // WorkEmails claims EMAIL via alias; HomeEmails' best semantic
        // candidate is the claimed EMAIL, so it must stay unmapped.
        assert_eq!(
            report.mapping_for_source("WorkEmails").unwrap().target,
            "EMAIL"
        );
        assert!(report.unmapped_sources.contains(&"HomeEmails".to_string()));
    }

    #[test]
    fn alternatives_are_capped_and_exclude_winner() {
        let (registry, aliases) = fixtures();
        let report = resolve_degraded("employee", &["Date"], &registry, &aliases);
        for m in &report.mappings {
            assert!(m.alternatives.len() <= 3);
            for alt in &m.alternatives {
                assert_ne!(alt.target, m.target);
            }
        }
    }

    /// Embedder with hand-picked unit vectors so similarity margins can
    /// be pinned exactly in tests.
    struct MockEmbedder {
        beta_doc: [f32; 2],
        query: [f32; 2],
    }

    impl crate::embedding::TextEmbedder for MockEmbedder {
        fn model_id(&self) -> &str {
            "mock"
        }

        fn dim(&self) -> usize {
            2
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, crate::embedding::EmbedError> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("Alpha") {
                        vec![1.0, 0.0]
                    } else if t.contains("Beta") {
                        self.beta_doc.to_vec()
                    } else {
                        self.query.to_vec()
                    }
                })
                .collect())
        }
    }

    fn two_field_schema() -> EntitySchema {
        let field = |name: &str, display: &str| talentmap_schema::FieldDefinition {
            name: name.into(),
            display_name: display.into(),
            semantic_type: talentmap_protocol::SemanticType::String,
            required: false,
            max_length: None,
            regex: None,
            format: None,
            example: String::new(),
            description: String::new(),
            default_value: None,
        };
        EntitySchema {
            name: "EF_Test".into(),
            description: String::new(),
            fields: vec![field("ALPHA_CODE", "Alpha"), field("BETA_CODE", "Beta")],
        }
    }

    #[test]
    fn ambiguous_semantic_winner_stays_unmapped() {
        // cos(query, Beta) ~ 0.79: within 0.01 similarity of the Alpha
        // winner, so the 0.03 confidence margin is not met. The fuzzy
        // stage cannot reach 0.70 either; the source must stay unmapped.
        let schema = two_field_schema();
        let aliases = EntityAliases::default();
        let embedder = MockEmbedder {
            // cos(query, Alpha) = 0.8, cos(query, Beta) ~ 0.79
            beta_doc: [0.2639, 0.9646],
            query: [0.8, 0.6],
        };
        let index = crate::embedding::index::EmbeddingIndex::build(
            &schema,
            &aliases,
            &embedder,
        )
        .unwrap();
        let resolver = FieldResolver::new(&schema, &aliases, Some((&index, &embedder)));
        let report = resolver
            .resolve(&["mystery".to_string()], 0.70, &CancellationToken::new())
            .unwrap();
        assert!(report.mappings.is_empty());
        assert_eq!(report.unmapped_sources, vec!["mystery".to_string()]);
    }

    #[test]
    fn clear_semantic_winner_commits_with_banded_confidence() {
        // cos(query, Alpha) = 0.9 vs cos(query, Beta) ~ 0.44: well past
        // the margin rule. Alpha commits as a semantic mapping.
        let schema = two_field_schema();
        let aliases = EntityAliases::default();
        let embedder = MockEmbedder {
            beta_doc: [0.0, 1.0],
            query: [0.9, 0.43589],
        };
        let index = crate::embedding::index::EmbeddingIndex::build(
            &schema,
            &aliases,
            &embedder,
        )
        .unwrap();
        let resolver = FieldResolver::new(&schema, &aliases, Some((&index, &embedder)));
        let report = resolver
            .resolve(&["mystery".to_string()], 0.70, &CancellationToken::new())
            .unwrap();
        let m = report.mapping_for_source("mystery").expect("committed");
        assert_eq!(m.target, "ALPHA_CODE");
        assert_eq!(m.method, MatchMethod::Semantic);
        assert!((m.confidence - (0.70 + 0.15 * 0.9)).abs() < 1e-5);
    }

    #[test]
    fn cancellation_unwinds_cleanly() {
        let (registry, aliases) = fixtures();
        let schema = registry.get("employee").unwrap();
        let entity_aliases = aliases.for_entity(&schema.name);
        let resolver = FieldResolver::new(schema, &entity_aliases, None);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = resolver
            .resolve(&["EMPLOYEE_ID".to_string()], 0.70, &cancel)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}
