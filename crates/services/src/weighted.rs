//! Category-weighted composite quizzes.

use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};

use quiz_core::model::{CategoryName, CategoryWeightTable, Question};

/// Questions drawn for one weighted quiz, plus any categories that ran short.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedDraw {
    pub questions: Vec<Question>,
    pub shortfalls: Vec<Shortfall>,
}

/// A category whose bucket held fewer questions than its apportioned share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortfall {
    pub category: CategoryName,
    pub desired: usize,
    pub drawn: usize,
}

/// Split `n` across the table's categories by largest remainder.
///
/// Each category gets `floor(w / total * n)`; the units left over go to the
/// largest fractional parts, ties resolved by table order. Returns the counts
/// in table order. A table with no positive weight gets nothing.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn apportion(table: &CategoryWeightTable, n: usize) -> Vec<(CategoryName, usize)> {
    let total = table.total();
    if n == 0 || total <= 0.0 {
        return table
            .entries()
            .iter()
            .map(|(name, _)| (name.clone(), 0))
            .collect();
    }

    let mut counts = Vec::with_capacity(table.entries().len());
    let mut fractions = Vec::with_capacity(table.entries().len());
    for (i, (name, weight)) in table.entries().iter().enumerate() {
        // share first so raw never exceeds n
        let raw = weight / total * n as f64;
        let floor = raw.floor();
        counts.push((name.clone(), (floor as usize).min(n)));
        fractions.push((i, raw - floor));
    }

    let assigned: usize = counts.iter().map(|(_, c)| c).sum();
    let remainder = n.saturating_sub(assigned);
    // stable sort keeps table order among equal fractions
    fractions.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (i, fraction) in fractions.into_iter().take(remainder) {
        if fraction > 0.0 {
            counts[i].1 += 1;
        }
    }
    counts
}

/// Group questions by category, first occurrence of an id wins.
///
/// Untagged questions land in the `Uncategorized` bucket.
#[must_use]
pub fn bucket_by_category(pool: Vec<Question>) -> HashMap<CategoryName, Vec<Question>> {
    let mut seen = HashSet::new();
    let mut buckets: HashMap<CategoryName, Vec<Question>> = HashMap::new();
    for question in pool {
        if !seen.insert(question.id().clone()) {
            continue;
        }
        let category = question
            .category()
            .cloned()
            .unwrap_or_else(CategoryName::uncategorized);
        buckets.entry(category).or_default().push(question);
    }
    buckets
}

/// Draw up to `n` questions from `pool` in proportion to `table`.
///
/// Each category contributes a uniform sample of its apportioned size; a bucket
/// that is too small is taken whole. Categories absent from the table are
/// never drawn. The combined draw is shuffled.
pub fn sample_weighted<R: Rng + ?Sized>(
    pool: Vec<Question>,
    table: &CategoryWeightTable,
    n: usize,
    rng: &mut R,
) -> WeightedDraw {
    let mut buckets = bucket_by_category(pool);
    let mut questions = Vec::with_capacity(n);
    let mut shortfalls = Vec::new();

    for (category, desired) in apportion(table, n) {
        if desired == 0 {
            continue;
        }
        let mut bucket = buckets.remove(&category).unwrap_or_default();
        let take = desired.min(bucket.len());
        let (chosen, _) = bucket.partial_shuffle(rng, take);
        questions.extend(chosen.iter().cloned());
        if take < desired {
            shortfalls.push(Shortfall {
                category,
                desired,
                drawn: take,
            });
        }
    }

    questions.shuffle(rng);
    WeightedDraw {
        questions,
        shortfalls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{Letter, QuestionId};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn table(entries: &[(&str, f64)]) -> CategoryWeightTable {
        CategoryWeightTable::new(entries.iter().map(|(n, w)| (*n, *w))).unwrap()
    }

    fn counts(table: &CategoryWeightTable, n: usize) -> Vec<(String, usize)> {
        apportion(table, n)
            .into_iter()
            .map(|(name, c)| (name.to_string(), c))
            .collect()
    }

    fn plain(prefix: &str, n: usize) -> Vec<Question> {
        (0..n)
            .map(|i| {
                Question::new(
                    QuestionId::new(format!("{prefix}{i}")),
                    "stem",
                    vec!["a".into(), "b".into()],
                    [Letter::from_char('A').unwrap()].into_iter().collect(),
                    "",
                    false,
                )
                .unwrap()
            })
            .collect()
    }

    fn tagged(prefix: &str, category: &str, n: usize) -> Vec<Question> {
        plain(prefix, n)
            .into_iter()
            .map(|q| q.with_category(CategoryName::new(category).unwrap()))
            .collect()
    }

    fn drawn_per_category(draw: &WeightedDraw) -> HashMap<String, usize> {
        let mut out = HashMap::new();
        for q in &draw.questions {
            *out.entry(q.category().unwrap().to_string()).or_insert(0) += 1;
        }
        out
    }

    #[test]
    fn apportions_exact_split() {
        let t = table(&[("A", 0.6), ("B", 0.4)]);
        assert_eq!(counts(&t, 10), vec![("A".into(), 6), ("B".into(), 4)]);
    }

    #[test]
    fn remainder_goes_to_largest_fraction() {
        let t = table(&[("A", 0.5), ("B", 0.3), ("C", 0.2)]);
        assert_eq!(
            counts(&t, 11),
            vec![("A".into(), 6), ("B".into(), 3), ("C".into(), 2)]
        );
    }

    #[test]
    fn equal_fractions_break_ties_by_table_order() {
        let t = table(&[("X", 1.0), ("Y", 1.0), ("Z", 1.0)]);
        assert_eq!(
            counts(&t, 4),
            vec![("X".into(), 2), ("Y".into(), 1), ("Z".into(), 1)]
        );
    }

    #[test]
    fn weights_need_not_sum_to_one() {
        let t = table(&[("A", 3.0), ("B", 1.0), ("C", 0.0)]);
        assert_eq!(
            counts(&t, 8),
            vec![("A".into(), 6), ("B".into(), 2), ("C".into(), 0)]
        );
    }

    #[test]
    fn huge_weights_still_apportion_n() {
        let t = table(&[("A", 1e308), ("B", 1.0)]);
        let split = counts(&t, 10);
        assert_eq!(split.iter().map(|(_, c)| c).sum::<usize>(), 10);
        assert_eq!(split, vec![("A".into(), 10), ("B".into(), 0)]);

        let mut rng = StdRng::seed_from_u64(5);
        let draw = sample_weighted(tagged("a", "A", 50), &t, 10, &mut rng);
        assert_eq!(draw.questions.len(), 10);
    }

    #[test]
    fn empty_table_apportions_nothing() {
        assert!(apportion(&CategoryWeightTable::default(), 10).is_empty());
    }

    #[test]
    fn sample_matches_apportioned_counts() {
        let t = table(&[("A", 0.6), ("B", 0.4)]);
        let mut pool = tagged("a", "A", 12);
        pool.extend(tagged("b", "B", 12));
        let mut rng = StdRng::seed_from_u64(7);

        let draw = sample_weighted(pool, &t, 10, &mut rng);
        assert_eq!(draw.questions.len(), 10);
        let per = drawn_per_category(&draw);
        assert_eq!(per.get("A"), Some(&6));
        assert_eq!(per.get("B"), Some(&4));
        assert!(draw.shortfalls.is_empty());
    }

    #[test]
    fn short_bucket_is_taken_whole_and_reported() {
        let t = table(&[("A", 0.5), ("B", 0.5)]);
        let mut pool = tagged("a", "A", 10);
        pool.extend(tagged("b", "B", 2));
        let mut rng = StdRng::seed_from_u64(1);

        let draw = sample_weighted(pool, &t, 10, &mut rng);
        assert_eq!(draw.questions.len(), 7);
        assert_eq!(
            draw.shortfalls,
            vec![Shortfall {
                category: CategoryName::new("B").unwrap(),
                desired: 5,
                drawn: 2,
            }]
        );
    }

    #[test]
    fn uncategorized_is_skipped_unless_weighted() {
        let untagged = plain("u", 5);
        let mut rng = StdRng::seed_from_u64(3);

        let only_a = table(&[("A", 1.0)]);
        let draw = sample_weighted(untagged.clone(), &only_a, 4, &mut rng);
        assert!(draw.questions.is_empty());

        let with_uncat = table(&[("Uncategorized", 1.0)]);
        let draw = sample_weighted(untagged, &with_uncat, 4, &mut rng);
        assert_eq!(draw.questions.len(), 4);
    }

    #[test]
    fn duplicate_ids_are_drawn_once() {
        let t = table(&[("A", 1.0)]);
        let mut pool = tagged("a", "A", 3);
        pool.extend(tagged("a", "A", 3));
        let mut rng = StdRng::seed_from_u64(9);

        let draw = sample_weighted(pool, &t, 6, &mut rng);
        let ids: HashSet<_> = draw.questions.iter().map(|q| q.id().clone()).collect();
        assert_eq!(draw.questions.len(), 3);
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn same_seed_gives_same_order() {
        let t = table(&[("A", 0.5), ("B", 0.5)]);
        let mut pool = tagged("a", "A", 8);
        pool.extend(tagged("b", "B", 8));

        let first = sample_weighted(pool.clone(), &t, 6, &mut StdRng::seed_from_u64(42));
        let second = sample_weighted(pool, &t, 6, &mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);
    }
}
