use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use recallkit_core::aggregate::ScoreAggregator;
use recallkit_core::distance::edit_distance;
use recallkit_core::error::PhoneticError;
use recallkit_core::matcher::WordMatcher;
use recallkit_core::model::{MatchingStrategy, PhoneticCode, TranscribedWord, WordList};
use recallkit_core::phonetic::PhoneticEncoder;
use recallkit_core::scoring::RecallScoringEngine;

/// Consonant skeleton, enough to exercise the phonetic channel.
struct Consonants;

impl PhoneticEncoder for Consonants {
    fn name(&self) -> &str {
        "consonants"
    }

    fn encode(&self, word: &str) -> Result<PhoneticCode, PhoneticError> {
        let code: String = word
            .to_ascii_uppercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic() && !"AEIOU".contains(*c))
            .take(4)
            .collect();
        Ok(PhoneticCode::new(code, ""))
    }
}

const TARGETS: [&str; 15] = [
    "drum", "curtain", "bell", "coffee", "school", "parent", "moon", "garden", "hat", "farmer",
    "nose", "turkey", "colour", "house", "river",
];

const SPOKEN: [&str; 10] = [
    "drum", "curtains", "bell", "cough", "parent", "moon", "guarding", "hat", "former", "rivers",
];

fn trial_input() -> (WordList, Vec<TranscribedWord>) {
    let targets: WordList = TARGETS.into_iter().collect();
    let transcribed = (0..4u32)
        .flat_map(|cycle| SPOKEN.iter().map(move |w| TranscribedWord::new(*w, cycle)))
        .collect();
    (targets, transcribed)
}

fn bench_edit_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("edit_distance");

    group.bench_function("short", |b| {
        b.iter(|| edit_distance(black_box("apple"), black_box("appel")))
    });

    group.bench_function("long", |b| {
        b.iter(|| edit_distance(black_box("pneumonoultramicroscopic"), black_box("ultramicroscopically")))
    });

    group.finish();
}

fn bench_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("score_trial");
    let (targets, transcribed) = trial_input();
    let matcher = WordMatcher::new(Arc::new(Consonants));

    for strategy in [MatchingStrategy::Independent, MatchingStrategy::Exclusive] {
        let aggregator =
            ScoreAggregator::new(RecallScoringEngine::new(matcher.clone()).with_strategy(strategy));
        group.bench_function(strategy.to_string(), |b| {
            b.iter(|| aggregator.summarize(black_box(&targets), black_box(&transcribed)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_edit_distance, bench_scoring);
criterion_main!(benches);
