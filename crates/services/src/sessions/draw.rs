use rand::Rng;
use rand::seq::index;
use std::collections::BTreeSet;

use quiz_core::model::{Question, QuestionId};

/// Uniform sample of `count` questions without replacement, in random order.
///
/// When `previous` is given and a different set is possible, redraws up to
/// `attempts` times to avoid handing back the exact same set of ids. The last
/// draw is kept if every attempt matched.
pub(crate) fn draw_sample<R: Rng + ?Sized>(
    pool: &[&Question],
    count: usize,
    previous: Option<&BTreeSet<QuestionId>>,
    attempts: u32,
    rng: &mut R,
) -> Vec<Question> {
    let count = count.min(pool.len());
    let avoid = previous.filter(|_| count < pool.len());

    let mut picks = index::sample(rng, pool.len(), count);
    if let Some(previous) = avoid {
        for attempt in 1..attempts.max(1) {
            if id_set(pool, &picks) != *previous {
                break;
            }
            tracing::debug!(attempt, "draw repeated previous sample, redrawing");
            picks = index::sample(rng, pool.len(), count);
        }
    }

    picks.iter().map(|i| pool[i].clone()).collect()
}

fn id_set(pool: &[&Question], picks: &index::IndexVec) -> BTreeSet<QuestionId> {
    picks.iter().map(|i| pool[i].id().clone()).collect()
}
