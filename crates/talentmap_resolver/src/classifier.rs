//! Entity classification: which target entity does a source file most
//! likely describe?
//!
//! Each candidate entity gets a full resolution pass; its score is the
//! method-weighted confidence sum normalized by the source column count.
//! Ties go to the entity with the highest required-field coverage.

use talentmap_protocol::{
    CancellationToken, EntityDetection, PipelineError, PipelineResult, ResolutionReport,
};
use talentmap_schema::{EntityAliases, EntitySchema};

use crate::embedding::index::EmbeddingIndex;
use crate::embedding::TextEmbedder;
use crate::resolver::FieldResolver;

/// Everything needed to resolve against one candidate entity.
pub struct EntityCandidate<'a> {
    pub schema: &'a EntitySchema,
    pub aliases: &'a EntityAliases,
    pub semantic: Option<(&'a EmbeddingIndex, &'a dyn TextEmbedder)>,
}

/// Score one resolution report: `sum(conf * method_weight) / |sources|`.
fn score_report(report: &ResolutionReport, source_count: usize) -> f64 {
    if source_count == 0 {
        return 0.0;
    }
    let total: f64 = report
        .mappings
        .iter()
        .map(|m| m.confidence * m.method.weight())
        .sum();
    total / source_count as f64
}

/// Fraction of the entity's required fields that received a mapping.
fn required_coverage(schema: &EntitySchema, report: &ResolutionReport) -> f64 {
    let required: Vec<&str> = schema.required_fields().map(|f| f.name.as_str()).collect();
    if required.is_empty() {
        return 1.0;
    }
    let covered = required
        .iter()
        .filter(|name| report.mapping_for_target(name).is_some())
        .count();
    covered as f64 / required.len() as f64
}

/// Run the resolver against every candidate entity and pick the best fit.
pub fn detect_entity(
    source_columns: &[String],
    candidates: &[EntityCandidate<'_>],
    min_confidence: f64,
    cancel: &CancellationToken,
) -> PipelineResult<EntityDetection> {
    let mut scored: Vec<(String, f64, f64)> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let resolver = FieldResolver::new(candidate.schema, candidate.aliases, candidate.semantic);
        let report = resolver.resolve(source_columns, min_confidence, cancel)?;
        let score = score_report(&report, source_columns.len());
        let coverage = required_coverage(candidate.schema, &report);
        tracing::debug!(
            entity = %candidate.schema.name,
            score,
            coverage,
            mapped = report.mappings.len(),
            "scored candidate entity"
        );
        scored.push((candidate.schema.name.clone(), score, coverage));
    }

    // Score first; required-field coverage breaks ties; name keeps the
    // ordering total.
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.0.cmp(&b.0))
    });

    let best = scored.first().ok_or_else(|| PipelineError::SchemaNotFound {
        entity: "(none)".to_string(),
        known: String::new(),
    })?;

    Ok(EntityDetection {
        entity: best.0.clone(),
        confidence: best.1,
        all_scores: scored.iter().map(|(name, s, _)| (name.clone(), *s)).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use talentmap_schema::{AliasDictionary, SchemaRegistry};

    fn detect(columns: &[&str]) -> EntityDetection {
        let registry = SchemaRegistry::builtin().unwrap();
        let aliases = AliasDictionary::builtin(&registry).unwrap();
        let entity_aliases: Vec<_> = registry
            .entities()
            .iter()
            .map(|e| aliases.for_entity(&e.name))
            .collect();
        let candidates: Vec<EntityCandidate<'_>> = registry
            .entities()
            .iter()
            .zip(entity_aliases.iter())
            .map(|(schema, aliases)| EntityCandidate {
                schema,
                aliases,
                semantic: None,
            })
            .collect();
        let columns: Vec<String> = columns.iter().map(|s| s.to_string()).collect();
        detect_entity(&columns, &candidates, 0.70, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn siemens_candidate_file_classifies_as_candidate() {
        let detection = detect(&[
            "PersonID",
            "FirstName",
            "LastName",
            "WorkEmails",
            "WorkPhones",
            "LastActivityTimeStamp",
        ]);
        assert_eq!(detection.entity, "EF_Candidate");
        assert!(detection.confidence > 0.5);
        assert_eq!(detection.all_scores.len(), 3);
        assert!(detection.all_scores[0].1 >= detection.all_scores[1].1);
    }

    #[test]
    fn employee_file_classifies_as_employee() {
        let detection = detect(&["EmployeeID", "Hire Date", "Job Title", "Department"]);
        assert_eq!(detection.entity, "EF_Employee");
    }

    #[test]
    fn position_file_classifies_as_position() {
        let detection = detect(&["Requisition ID", "Req Title", "Openings", "Posted Date"]);
        assert_eq!(detection.entity, "EF_Position");
    }

    #[test]
    fn unmatchable_columns_score_near_zero() {
        let detection = detect(&["Quux", "Blorp"]);
        assert!(detection.confidence < 0.35);
    }
}
