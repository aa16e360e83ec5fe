use crate::config::EngineConfig;
use crate::error::{Result, VatSummaryError};
use crate::schema::{
    CellValue, CollaboratorOutcome, ColumnMapping, ColumnRole, MatchSource, RawRow,
};
use crate::suggest::{suggest_with_timeout, ColumnSuggester};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Shared words over distinct words across both token lists.
pub fn token_overlap(a: &[String], b: &[String]) -> f64 {
    let left: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let right: BTreeSet<&str> = b.iter().map(String::as_str).collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

/// Assigns canonical roles to the columns of one sheet.
///
/// Matching is a pure function of the headers, the synonym table and the
/// (optional) suggester answer. Row data never changes the outcome.
pub struct ColumnClassifier<'a> {
    config: &'a EngineConfig,
    suggester: Option<Arc<dyn ColumnSuggester>>,
    synonym_tokens: Vec<(ColumnRole, Vec<Vec<String>>)>,
}

impl<'a> ColumnClassifier<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        let synonym_tokens = ColumnRole::ASSIGNABLE
            .iter()
            .map(|role| {
                let phrases = config
                    .synonyms
                    .synonyms(*role)
                    .iter()
                    .map(|phrase| config.synonyms.tokens(phrase))
                    .filter(|tokens| !tokens.is_empty())
                    .collect();
                (*role, phrases)
            })
            .collect();

        Self {
            config,
            suggester: None,
            synonym_tokens,
        }
    }

    pub fn with_suggester(mut self, suggester: Option<Arc<dyn ColumnSuggester>>) -> Self {
        self.suggester = suggester;
        self
    }

    /// Role whose synonym equals the header after normalization, in role order.
    fn exact_roles(&self, tokens: &[String]) -> Vec<ColumnRole> {
        self.synonym_tokens
            .iter()
            .filter(|(_, phrases)| phrases.iter().any(|p| p.as_slice() == tokens))
            .map(|(role, _)| *role)
            .collect()
    }

    fn fuzzy_score(&self, role: ColumnRole, tokens: &[String]) -> f64 {
        self.synonym_tokens
            .iter()
            .filter(|(r, _)| *r == role)
            .flat_map(|(_, phrases)| phrases.iter())
            .map(|phrase| token_overlap(tokens, phrase))
            .fold(0.0, f64::max)
    }

    /// Best role for a lone header, ignoring competition with other columns.
    pub fn best_role(&self, header: &str) -> Option<(ColumnRole, MatchSource)> {
        let tokens = self.config.synonyms.tokens(header);
        if tokens.is_empty() {
            return None;
        }
        if let Some(role) = self.exact_roles(&tokens).first() {
            return Some((*role, MatchSource::Exact));
        }
        if self.config.synonyms.is_excluded(&tokens) {
            return None;
        }
        ColumnRole::ASSIGNABLE
            .iter()
            .map(|role| (*role, self.fuzzy_score(*role, &tokens)))
            .filter(|(_, score)| *score >= self.config.match_threshold)
            .fold(None, |best: Option<(ColumnRole, f64)>, (role, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((role, score)),
            })
            .map(|(role, score)| (role, MatchSource::Fuzzy { score }))
    }

    /// Classifies the header row of sheet `period`.
    ///
    /// Fails with [`VatSummaryError::NoUsableColumns`] when no supply,
    /// purchase or VAT column can be identified.
    pub fn classify(
        &self,
        period: &str,
        headers: &[String],
        sample_rows: &[RawRow],
    ) -> Result<ColumnMapping> {
        let tokens: Vec<Vec<String>> = headers
            .iter()
            .map(|h| self.config.synonyms.tokens(h))
            .collect();

        let mut roles = vec![ColumnRole::Ignored; headers.len()];
        let mut sources = BTreeMap::new();

        for (idx, header_tokens) in tokens.iter().enumerate() {
            if header_tokens.is_empty() {
                continue;
            }
            let free = self
                .exact_roles(header_tokens)
                .into_iter()
                .find(|role| !roles.contains(role));
            if let Some(role) = free {
                debug!("[{}] '{}' -> {} (exact)", period, headers[idx], role);
                roles[idx] = role;
                sources.insert(idx, MatchSource::Exact);
            }
        }

        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
        for (idx, header_tokens) in tokens.iter().enumerate() {
            if roles[idx] != ColumnRole::Ignored
                || header_tokens.is_empty()
                || self.config.synonyms.is_excluded(header_tokens)
            {
                continue;
            }
            for (role_idx, role) in ColumnRole::ASSIGNABLE.iter().enumerate() {
                if roles.contains(role) {
                    continue;
                }
                let score = self.fuzzy_score(*role, header_tokens);
                if score >= self.config.match_threshold {
                    candidates.push((score, idx, role_idx));
                }
            }
        }

        candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        for (score, idx, role_idx) in candidates {
            let role = ColumnRole::ASSIGNABLE[role_idx];
            if roles[idx] != ColumnRole::Ignored || roles.contains(&role) {
                continue;
            }
            debug!(
                "[{}] '{}' -> {} (fuzzy {:.2})",
                period, headers[idx], role, score
            );
            roles[idx] = role;
            sources.insert(idx, MatchSource::Fuzzy { score });
        }

        let collaborator = self.consult_suggester(period, headers, &mut roles, &mut sources);

        let mapping = ColumnMapping::new(headers.to_vec(), roles, sources, collaborator);

        if !mapping.has_value_column() {
            return Err(VatSummaryError::NoUsableColumns {
                period: period.to_string(),
            });
        }

        self.check_sample(period, &mapping, sample_rows);

        Ok(mapping)
    }

    fn consult_suggester(
        &self,
        period: &str,
        headers: &[String],
        roles: &mut [ColumnRole],
        sources: &mut BTreeMap<usize, MatchSource>,
    ) -> CollaboratorOutcome {
        let Some(suggester) = &self.suggester else {
            return CollaboratorOutcome::NotConsulted;
        };

        let open_roles: Vec<ColumnRole> = ColumnRole::ASSIGNABLE
            .iter()
            .copied()
            .filter(|role| !roles.contains(role))
            .collect();

        let unmatched: Vec<usize> = (0..headers.len())
            .filter(|idx| roles[*idx] == ColumnRole::Ignored && !headers[*idx].trim().is_empty())
            .collect();

        if open_roles.is_empty() || unmatched.is_empty() {
            return CollaboratorOutcome::NotConsulted;
        }

        let mut unmatched_headers: Vec<String> = Vec::new();
        for idx in &unmatched {
            if !unmatched_headers.contains(&headers[*idx]) {
                unmatched_headers.push(headers[*idx].clone());
            }
        }
        let role_names = open_roles.iter().map(|r| r.as_str().to_string()).collect();

        let answer = match suggest_with_timeout(
            suggester,
            unmatched_headers,
            role_names,
            self.config.suggester_timeout(),
        ) {
            Ok(answer) => answer,
            Err(e) => {
                warn!(
                    "[{}] column suggester failed, keeping heuristic mapping: {}",
                    period, e
                );
                return CollaboratorOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let mut accepted = 0;
        for idx in unmatched {
            let header = &headers[idx];
            let suggestion = answer.get(header).or_else(|| {
                answer
                    .iter()
                    .find(|(key, _)| key.trim() == header.trim())
                    .map(|(_, value)| value)
            });
            let Some(role) = suggestion.and_then(|s| s.parse::<ColumnRole>().ok()) else {
                continue;
            };
            if !open_roles.contains(&role) || roles.contains(&role) {
                debug!(
                    "[{}] ignoring suggestion '{}' for '{}'",
                    period, role, header
                );
                continue;
            }
            debug!("[{}] '{}' -> {} (suggested)", period, header, role);
            roles[idx] = role;
            sources.insert(idx, MatchSource::Suggested);
            accepted += 1;
        }

        CollaboratorOutcome::Applied { accepted }
    }

    fn check_sample(&self, period: &str, mapping: &ColumnMapping, sample_rows: &[RawRow]) {
        for role in ColumnRole::VALUE_ROLES {
            let Some(column) = mapping.column_for(role) else {
                continue;
            };
            let cells: Vec<&CellValue> = sample_rows
                .iter()
                .map(|row| row.get(column))
                .filter(|cell| !cell.is_blank())
                .collect();
            if !cells.is_empty() && cells.iter().all(|cell| cell.to_decimal().is_none()) {
                warn!(
                    "[{}] column '{}' was classified as {} but no sampled value is numeric",
                    period,
                    mapping.headers()[column],
                    role
                );
            }
        }
    }

    /// Index of the first grid row that looks like a header row.
    ///
    /// A row qualifies when at least two of its cells match a role. Falls
    /// back to row 0 when nothing in the scanned window qualifies.
    pub fn detect_header_row(&self, grid: &[Vec<CellValue>]) -> usize {
        grid.iter()
            .take(self.config.header_scan_rows)
            .position(|row| {
                row.iter()
                    .filter_map(|cell| match cell {
                        CellValue::Text(text) => self.best_role(text),
                        _ => None,
                    })
                    .count()
                    >= 2
            })
            .unwrap_or(0)
    }
}
