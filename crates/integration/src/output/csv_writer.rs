//! Tabular outputs: the integrated master table and the per-kind source
//! tables.

use std::fmt::Display;
use std::path::Path;

use varlens_variant_data::{
    Annotation, AnnotationKind, DomainSpan, PopulationCounts, QtlAssociation,
};

use crate::errors::Result;
use crate::integration::{IntegratedVariantRecord, SourceTableRow, Sourced};

const LIST_SEPARATOR: &str = "|";

const MASTER_COLUMNS: &[&str] = &[
    "variant_key",
    "unresolved",
    "unresolved_reason",
    "chromosome",
    "position",
    "reference",
    "alternate",
    "assembly",
    "accession",
    "descriptors",
    "sources",
    "genome_af",
    "exome_af",
    "minor_allele_frequency",
    "rarity",
    "most_severe_consequence",
    "consequence_terms",
    "clinical_significance",
    "transcripts",
    "sift_score",
    "sift_prediction",
    "sift_class",
    "polyphen_score",
    "polyphen_prediction",
    "polyphen_class",
    "protein_position",
    "amino_acids",
    "domains",
    "eqtl_count",
    "eqtl_min_p_value",
    "eqtl_tissues",
    "eqtl_significance",
    "pqtl_count",
    "pqtl_min_p_value",
    "pqtl_studies",
    "pqtl_significance",
    "gwas_count",
    "gwas_min_p_value",
    "gwas_traits",
    "gwas_significance",
    "has_conflict",
    "coverage",
];

const TABLE_KEY_COLUMNS: &[&str] = &["variant_key", "unresolved", "source", "descriptor"];

pub fn write_master(path: &Path, records: &[IntegratedVariantRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(MASTER_COLUMNS)?;
    for record in records {
        writer.write_record(master_row(record))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_source_table(path: &Path, kind: AnnotationKind, rows: &[SourceTableRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let header: Vec<&str> = TABLE_KEY_COLUMNS
        .iter()
        .chain(annotation_columns(kind))
        .copied()
        .collect();
    writer.write_record(&header)?;
    for row in rows {
        let mut fields = vec![
            row.variant.clone(),
            row.unresolved.to_string(),
            row.source.clone(),
            row.descriptor.clone(),
        ];
        fields.extend(annotation_values(&row.annotation));
        writer.write_record(&fields)?;
    }
    writer.flush()?;
    Ok(())
}

fn master_row(record: &IntegratedVariantRecord) -> Vec<String> {
    let identity = &record.identity;
    let key = identity.key.as_ref();
    let class = &record.classification;

    vec![
        identity.label.clone(),
        identity.unresolved.to_string(),
        identity.unresolved_reason.clone().unwrap_or_default(),
        key.map(|k| k.chromosome.to_string()).unwrap_or_default(),
        key.map(|k| k.position.to_string()).unwrap_or_default(),
        key.map(|k| k.reference.clone()).unwrap_or_default(),
        key.map(|k| k.alternate.clone()).unwrap_or_default(),
        key.map(|k| k.assembly.to_string()).unwrap_or_default(),
        record.accession.display(),
        join(&record.descriptors),
        join(&record.sources),
        record.genome_af.display(),
        record.exome_af.display(),
        record.minor_allele_frequency.display(),
        class.rarity.to_string(),
        record.most_severe_consequence.display(),
        join(&record.consequence_terms),
        join(&record.clinical_significance),
        join(&record.transcripts),
        record.sift_score.display(),
        join(&record.sift_predictions),
        class.sift.to_string(),
        record.polyphen_score.display(),
        join(&record.polyphen_predictions),
        class.polyphen.to_string(),
        record.protein_position.display(),
        join(&record.amino_acids),
        domains(&record.domains),
        record.eqtls.len().to_string(),
        min_p_value(record.eqtls.iter().map(|a| a.value.p_value)),
        contexts(&record.eqtls),
        class.eqtl.to_string(),
        record.pqtls.len().to_string(),
        min_p_value(record.pqtls.iter().map(|a| a.value.p_value)),
        contexts(&record.pqtls),
        class.pqtl.to_string(),
        record.gwas.len().to_string(),
        min_p_value(record.gwas.iter().map(|a| a.value.p_value)),
        distinct(record.gwas.iter().filter_map(|a| a.value.trait_name.clone())),
        class.gwas.to_string(),
        record.has_conflict().to_string(),
        record
            .coverage
            .iter()
            .map(|(source, coverage)| format!("{}={}", source, coverage))
            .collect::<Vec<_>>()
            .join(";"),
    ]
}

fn annotation_columns(kind: AnnotationKind) -> &'static [&'static str] {
    match kind {
        AnnotationKind::Listing => &[
            "accession",
            "consequence",
            "clinical_significance",
            "minor_allele_frequency",
        ],
        AnnotationKind::Frequency => &[
            "genome_af",
            "genome_ac",
            "genome_an",
            "genome_homozygotes",
            "exome_af",
            "exome_ac",
            "exome_an",
            "exome_homozygotes",
        ],
        AnnotationKind::Eqtl => &["tissue", "p_value", "effect_size", "molecular_trait"],
        AnnotationKind::Pqtl => &["study", "p_value", "effect_size", "molecular_trait"],
        AnnotationKind::Gwas => &["trait", "p_value", "study", "placement"],
        AnnotationKind::Functional => &[
            "most_severe_consequence",
            "transcript_id",
            "consequence_terms",
            "sift_score",
            "sift_prediction",
            "polyphen_score",
            "polyphen_prediction",
            "amino_acids",
            "codons",
            "protein_start",
            "protein_end",
        ],
        AnnotationKind::Domain => &["protein_accession", "protein_start", "protein_end", "domains"],
    }
}

fn annotation_values(annotation: &Annotation) -> Vec<String> {
    match annotation {
        Annotation::Listing(l) => vec![
            opt(&l.accession),
            opt(&l.consequence),
            join(&l.clinical_significance),
            opt(&l.minor_allele_frequency),
        ],
        Annotation::Frequency(f) => {
            let mut values = counts(f.genome.as_ref());
            values.extend(counts(f.exome.as_ref()));
            values
        }
        Annotation::Eqtl(q) | Annotation::Pqtl(q) => vec![
            q.context.clone(),
            opt(&q.p_value),
            opt(&q.effect_size),
            opt(&q.molecular_trait),
        ],
        Annotation::Gwas(g) => vec![
            opt(&g.trait_name),
            opt(&g.p_value),
            opt(&g.study),
            g.placement.to_string(),
        ],
        Annotation::Functional(f) => vec![
            opt(&f.most_severe_consequence),
            opt(&f.transcript_id),
            join(&f.consequence_terms),
            opt(&f.sift_score),
            opt(&f.sift_prediction),
            opt(&f.polyphen_score),
            opt(&f.polyphen_prediction),
            opt(&f.amino_acids),
            opt(&f.codons),
            opt(&f.protein_start),
            opt(&f.protein_end),
        ],
        Annotation::Domain(d) => vec![
            d.protein_accession.clone(),
            d.protein_start.to_string(),
            d.protein_end.to_string(),
            domains(&d.domains),
        ],
    }
}

fn counts(counts: Option<&PopulationCounts>) -> Vec<String> {
    match counts {
        Some(c) => vec![
            opt(&c.frequency()),
            opt(&c.allele_count),
            opt(&c.allele_number),
            opt(&c.homozygote_count),
        ],
        None => vec![String::new(); 4],
    }
}

fn opt<T: Display>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

fn join(values: &[String]) -> String {
    values.join(LIST_SEPARATOR)
}

fn distinct(values: impl Iterator<Item = String>) -> String {
    let mut values: Vec<String> = values.collect();
    values.sort();
    values.dedup();
    values.join(LIST_SEPARATOR)
}

fn contexts(associations: &[Sourced<QtlAssociation>]) -> String {
    distinct(associations.iter().map(|a| a.value.context.clone()))
}

fn min_p_value(p_values: impl Iterator<Item = Option<f64>>) -> String {
    p_values
        .flatten()
        .min_by(f64::total_cmp)
        .map(|p| p.to_string())
        .unwrap_or_default()
}

fn domains(domains: &[DomainSpan]) -> String {
    domains
        .iter()
        .map(|d| format!("{}({}-{})", d.description, d.start, d.end))
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use varlens_variant_data::{FrequencyAnnotation, GenePlacement, GwasAssociation};

    use super::*;

    #[test]
    fn test_annotation_values_match_columns() {
        let annotations = vec![
            Annotation::Frequency(FrequencyAnnotation {
                genome: Some(PopulationCounts {
                    allele_count: Some(3),
                    allele_number: Some(1500),
                    ..Default::default()
                }),
                exome: None,
            }),
            Annotation::Gwas(GwasAssociation {
                trait_name: Some("LDL cholesterol".to_string()),
                p_value: Some(2e-9),
                study: None,
                placement: GenePlacement::NearGene,
            }),
        ];
        for annotation in &annotations {
            assert_eq!(
                annotation_values(annotation).len(),
                annotation_columns(annotation.kind()).len()
            );
        }

        let frequency = annotation_values(&annotations[0]);
        assert_eq!(frequency[0], "0.002");
        assert_eq!(frequency[1], "3");
        assert_eq!(frequency[4], "");
        assert_eq!(annotation_values(&annotations[1])[3], "near_gene");
    }

    #[test]
    fn test_list_helpers() {
        assert_eq!(
            distinct(vec!["b".to_string(), "a".to_string(), "b".to_string()].into_iter()),
            "a|b"
        );
        assert_eq!(min_p_value(vec![Some(0.2), None, Some(1e-6)].into_iter()), "0.000001");
        assert_eq!(min_p_value(vec![None].into_iter()), "");
        assert_eq!(
            domains(&[DomainSpan {
                description: "PA26".to_string(),
                start: 60,
                end: 480
            }]),
            "PA26(60-480)"
        );
    }
}
