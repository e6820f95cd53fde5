//! Boolean queries: clause grouping, simplification and scorer planning.

use crate::error::Result;
use crate::index::reader::LeafReaderContext;
use crate::search::bulk::{BooleanScorer, BulkScorer, DefaultBulkScorer, ReqExclBulkScorer};
use crate::search::scorer::{
    ConjunctionScorer, ConstantScoreScorer, DisjunctionScorer, ReqExclScorer, ReqOptSumScorer,
    Scorer,
};
use crate::search::{Explanation, Occur, Query, ScoreMode, Weight};

/// A Boolean combination of sub-queries with `min_should_match`.
#[derive(Debug, Clone, Default)]
pub struct BooleanQuery {
    /// The clauses with their occurrence roles.
    pub clauses: Vec<(Occur, Query)>,
    /// Minimum number of `Should` clauses a match must satisfy.
    pub min_should_match: u32,
}

impl BooleanQuery {
    /// New empty boolean query.
    pub fn new() -> Self {
        BooleanQuery::default()
    }

    /// Add a clause.
    pub fn add(mut self, occur: Occur, query: Query) -> Self {
        self.clauses.push((occur, query));
        self
    }

    /// Add a required scoring clause.
    pub fn must(self, query: Query) -> Self {
        self.add(Occur::Must, query)
    }

    /// Add an optional clause.
    pub fn should(self, query: Query) -> Self {
        self.add(Occur::Should, query)
    }

    /// Add a prohibited clause.
    pub fn must_not(self, query: Query) -> Self {
        self.add(Occur::MustNot, query)
    }

    /// Add a required non-scoring clause.
    pub fn filter(self, query: Query) -> Self {
        self.add(Occur::Filter, query)
    }

    /// Require at least `n` of the `Should` clauses.
    pub fn with_min_should_match(mut self, n: u32) -> Self {
        self.min_should_match = n;
        self
    }

    /// The clauses with the given occurrence.
    pub fn clauses_with(&self, occur: Occur) -> impl Iterator<Item = &Query> {
        self.clauses
            .iter()
            .filter(move |(o, _)| *o == occur)
            .map(|(_, q)| q)
    }
}

/// The compiled weight of a [`BooleanQuery`].
pub struct BooleanWeight {
    clauses: Vec<(Occur, Box<dyn Weight>)>,
    min_should_match: u32,
    score_mode: ScoreMode,
}

/// Sub-scorers of one leaf grouped by occurrence.
struct GroupedScorers {
    required: Vec<Box<dyn Scorer>>,
    required_scoring: Vec<bool>,
    optional: Vec<Box<dyn Scorer>>,
    prohibited: Vec<Box<dyn Scorer>>,
    min_should_match: usize,
}

impl BooleanWeight {
    /// Build the weight from already-compiled clause weights.
    pub fn new(
        clauses: Vec<(Occur, Box<dyn Weight>)>,
        min_should_match: u32,
        score_mode: ScoreMode,
    ) -> Self {
        BooleanWeight {
            clauses,
            min_should_match,
            score_mode,
        }
    }

    /// Collect per-leaf sub-scorers and run the clause simplifications.
    ///
    /// Returns `None` when the leaf cannot match: a required clause is
    /// absent, fewer optional clauses exist than `min_should_match`, or no
    /// positive clause exists at all.
    fn group_scorers(&self, leaf: &LeafReaderContext<'_>) -> Result<Option<GroupedScorers>> {
        let mut group = GroupedScorers {
            required: Vec::new(),
            required_scoring: Vec::new(),
            optional: Vec::new(),
            prohibited: Vec::new(),
            min_should_match: self.min_should_match as usize,
        };
        for (occur, weight) in &self.clauses {
            match occur {
                Occur::Must | Occur::Filter => match weight.scorer(leaf)? {
                    Some(scorer) => {
                        group.required.push(scorer);
                        group.required_scoring.push(*occur == Occur::Must);
                    }
                    None => return Ok(None),
                },
                Occur::Should => {
                    if let Some(scorer) = weight.scorer(leaf)? {
                        group.optional.push(scorer);
                    }
                }
                Occur::MustNot => {
                    if let Some(scorer) = weight.scorer(leaf)? {
                        group.prohibited.push(scorer);
                    }
                }
            }
        }

        // every optional clause is in fact required
        if group.min_should_match > 0 && group.optional.len() == group.min_should_match {
            for scorer in group.optional.drain(..) {
                group.required.push(scorer);
                group.required_scoring.push(true);
            }
            group.min_should_match = 0;
        }

        if group.required.is_empty() && group.optional.is_empty() {
            // no positive clause at all
            return Ok(None);
        }
        if group.optional.len() < group.min_should_match {
            return Ok(None);
        }
        Ok(Some(group))
    }

    fn positive_scorer(&self, group: GroupedScorers) -> Result<Option<(Box<dyn Scorer>, Vec<Box<dyn Scorer>>)>> {
        let GroupedScorers {
            mut required,
            required_scoring,
            optional,
            prohibited,
            min_should_match,
        } = group;

        let positive: Box<dyn Scorer> = if required.is_empty() {
            Box::new(DisjunctionScorer::new(optional, min_should_match.max(1))?)
        } else {
            let base: Box<dyn Scorer> = if required.len() == 1 {
                let scorer = required.pop().ok_or_else(|| {
                    crate::error::FalxError::invalid_argument("required scorer vanished")
                })?;
                if required_scoring[0] {
                    scorer
                } else {
                    // a lone filter iterates but never scores
                    Box::new(ConstantScoreScorer::new(scorer, 0.0))
                }
            } else {
                Box::new(ConjunctionScorer::new(required, required_scoring)?)
            };
            if optional.is_empty() {
                base
            } else if min_should_match > 0 {
                // the optional clauses are jointly required
                let disjunction = Box::new(DisjunctionScorer::new(optional, min_should_match)?);
                Box::new(ConjunctionScorer::new(
                    vec![base, disjunction],
                    vec![true, true],
                )?)
            } else {
                let disjunction = Box::new(DisjunctionScorer::new(optional, 1)?);
                Box::new(ReqOptSumScorer::new(base, disjunction))
            }
        };
        Ok(Some((positive, prohibited)))
    }
}

impl Weight for BooleanWeight {
    fn scorer(&self, leaf: &LeafReaderContext<'_>) -> Result<Option<Box<dyn Scorer>>> {
        let group = match self.group_scorers(leaf)? {
            Some(group) => group,
            None => return Ok(None),
        };
        let (positive, prohibited) = match self.positive_scorer(group)? {
            Some(parts) => parts,
            None => return Ok(None),
        };
        if prohibited.is_empty() {
            Ok(Some(positive))
        } else {
            let excl: Box<dyn Scorer> = if prohibited.len() == 1 {
                prohibited.into_iter().next().ok_or_else(|| {
                    crate::error::FalxError::invalid_argument("prohibited scorer vanished")
                })?
            } else {
                Box::new(DisjunctionScorer::new(prohibited, 1)?)
            };
            Ok(Some(Box::new(ReqExclScorer::new(positive, excl))))
        }
    }

    fn bulk_scorer(&self, leaf: &LeafReaderContext<'_>) -> Result<Option<Box<dyn BulkScorer>>> {
        if self.score_mode == ScoreMode::TopScores {
            // per-doc scoring lets impacts prune non-competitive hits
            return match self.scorer(leaf)? {
                Some(scorer) => Ok(Some(Box::new(DefaultBulkScorer::new(scorer)))),
                None => Ok(None),
            };
        }

        let group = match self.group_scorers(leaf)? {
            Some(group) => group,
            None => return Ok(None),
        };

        if group.required.is_empty() {
            // pure disjunction: the window scorer is worthwhile unless a
            // minimum match count would make sparse windows wasted work
            let cost: u64 = group.optional.iter().map(|s| s.cost()).sum();
            let max_doc = leaf.reader.max_doc() as u64;
            if group.min_should_match <= 1 || cost >= max_doc / 3 {
                let min_should_match = group.min_should_match;
                let GroupedScorers {
                    optional,
                    prohibited,
                    ..
                } = group;
                let bulk: Box<dyn BulkScorer> =
                    Box::new(BooleanScorer::new(optional, min_should_match));
                return finish_bulk(bulk, prohibited);
            }
        } else if group.required.len() == 1
            && group.optional.is_empty()
            && group.min_should_match == 0
        {
            // forward the single required clause
            let GroupedScorers {
                mut required,
                required_scoring,
                prohibited,
                ..
            } = group;
            let scorer = match required.pop() {
                Some(scorer) => scorer,
                None => return Ok(None),
            };
            let scorer: Box<dyn Scorer> = if required_scoring[0] {
                scorer
            } else {
                Box::new(ConstantScoreScorer::new(scorer, 0.0))
            };
            let bulk: Box<dyn BulkScorer> = Box::new(DefaultBulkScorer::new(scorer));
            return finish_bulk(bulk, prohibited);
        }

        // conjunction fallback: scorer-based evaluation
        match self.scorer(leaf)? {
            Some(scorer) => Ok(Some(Box::new(DefaultBulkScorer::new(scorer)))),
            None => Ok(None),
        }
    }

    fn explain(&self, leaf: &LeafReaderContext<'_>, doc: u32) -> Result<Explanation> {
        let mut details = Vec::new();
        let mut total = 0.0f32;
        let mut should_matches = 0u32;
        for (occur, weight) in &self.clauses {
            let sub = weight.explain(leaf, doc)?;
            match occur {
                Occur::Must => {
                    if !sub.matched {
                        return Ok(Explanation::no_match("required clause does not match")
                            .with_details(vec![sub]));
                    }
                    total += sub.value;
                    details.push(sub);
                }
                Occur::Filter => {
                    if !sub.matched {
                        return Ok(Explanation::no_match("filter clause does not match")
                            .with_details(vec![sub]));
                    }
                }
                Occur::Should => {
                    if sub.matched {
                        should_matches += 1;
                        total += sub.value;
                        details.push(sub);
                    }
                }
                Occur::MustNot => {
                    if sub.matched {
                        return Ok(Explanation::no_match("prohibited clause matches")
                            .with_details(vec![sub]));
                    }
                }
            }
        }
        if should_matches < self.min_should_match {
            return Ok(Explanation::no_match(format!(
                "only {should_matches} of {} optional clauses match",
                self.min_should_match
            )));
        }
        let has_positive = self
            .clauses
            .iter()
            .any(|(o, _)| matches!(o, Occur::Must | Occur::Filter));
        if !has_positive && should_matches == 0 {
            return Ok(Explanation::no_match("no clause matches"));
        }
        Ok(Explanation::matched(total, "sum of matching clauses").with_details(details))
    }

    fn is_cacheable(&self, leaf: &LeafReaderContext<'_>) -> bool {
        self.clauses.len() <= 16 && self.clauses.iter().all(|(_, w)| w.is_cacheable(leaf))
    }
}

fn finish_bulk(
    positive: Box<dyn BulkScorer>,
    prohibited: Vec<Box<dyn Scorer>>,
) -> Result<Option<Box<dyn BulkScorer>>> {
    if prohibited.is_empty() {
        return Ok(Some(positive));
    }
    let excl: Box<dyn Scorer> = if prohibited.len() == 1 {
        match prohibited.into_iter().next() {
            Some(scorer) => scorer,
            None => return Ok(Some(positive)),
        }
    } else {
        Box::new(DisjunctionScorer::new(prohibited, 1)?)
    };
    Ok(Some(Box::new(ReqExclBulkScorer::new(positive, excl))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let query = BooleanQuery::new()
            .must(Query::term("f", "a"))
            .should(Query::term("f", "b"))
            .should(Query::term("f", "c"))
            .must_not(Query::term("f", "d"))
            .with_min_should_match(1);
        assert_eq!(query.clauses.len(), 4);
        assert_eq!(query.clauses_with(Occur::Should).count(), 2);
        assert_eq!(query.min_should_match, 1);
    }
}
