pub mod evaluator;

pub use evaluator::{
    Directive, Outcome, Requeue, RequeueTiming, Transition, transition,
};

// Unit tests for the transition function live in a sibling module file
#[cfg(test)]
mod evaluator_tests;
