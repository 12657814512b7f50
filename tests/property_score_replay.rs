//! Property tests for the event-sourced score invariants: incremental apply
//! always equals a full replay, replay is order independent, and the Beta
//! floor never breaks.

use proptest::prelude::*;
use uuid::Uuid;

use adlearn::domain::models::{Score, ScoreEvent, PRIOR_ALPHA, PRIOR_BETA};

fn arb_event() -> impl Strategy<Value = ScoreEvent> {
    (0.0..=1.0_f64, 0.1..=2.0_f64).prop_map(|(reward_value, weight)| {
        ScoreEvent::from_reward(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "hook_type",
            "curiosity_gap",
            reward_value,
            weight,
            0.5,
        )
    })
}

proptest! {
    #[test]
    fn apply_equals_replay(events in proptest::collection::vec(arb_event(), 0..50)) {
        let brand = Uuid::new_v4();

        let mut incremental = Score::cold_start(brand, "hook_type", "curiosity_gap");
        for event in &events {
            incremental.apply(event).unwrap();
        }

        let replayed =
            Score::replay(brand, "hook_type", "curiosity_gap", &events).unwrap();
        prop_assert!((incremental.alpha - replayed.alpha).abs() < 1e-9);
        prop_assert!((incremental.beta - replayed.beta).abs() < 1e-9);
        prop_assert!((incremental.observations - replayed.observations).abs() < 1e-9);
        prop_assert!((incremental.mean_reward - replayed.mean_reward).abs() < 1e-9);
    }

    #[test]
    fn replay_is_order_independent(
        events in proptest::collection::vec(arb_event(), 0..50),
    ) {
        let brand = Uuid::new_v4();
        let mut reversed = events.clone();
        reversed.reverse();

        let forward = Score::replay(brand, "hook_type", "curiosity_gap", &events).unwrap();
        let backward = Score::replay(brand, "hook_type", "curiosity_gap", &reversed).unwrap();
        prop_assert!((forward.alpha - backward.alpha).abs() < 1e-9);
        prop_assert!((forward.beta - backward.beta).abs() < 1e-9);
        prop_assert!((forward.mean_reward - backward.mean_reward).abs() < 1e-9);
    }

    #[test]
    fn posterior_floor_always_holds(
        events in proptest::collection::vec(arb_event(), 0..50),
    ) {
        let brand = Uuid::new_v4();
        let score = Score::replay(brand, "hook_type", "curiosity_gap", &events).unwrap();
        prop_assert!(score.alpha >= PRIOR_ALPHA);
        prop_assert!(score.beta >= PRIOR_BETA);
        prop_assert!(score.posterior_mean() > 0.0 && score.posterior_mean() < 1.0);
    }

    #[test]
    fn event_deltas_conserve_mass(reward_value in 0.0..=1.0_f64, weight in 0.1..=2.0_f64) {
        let event = ScoreEvent::from_reward(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "hook_type",
            "urgency",
            reward_value,
            weight,
            0.5,
        );
        prop_assert!(event.validate().is_ok());
        prop_assert!((event.alpha_delta + event.beta_delta - event.obs_delta).abs() < 1e-12);
        // Exactly one side carries the weight.
        prop_assert!(event.alpha_delta == 0.0 || event.beta_delta == 0.0);
    }
}
