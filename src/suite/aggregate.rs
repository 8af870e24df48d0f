use crate::core::{Outcome, Verdict};

/// Worst scenario outcome of one test. `skip` scenarios do not count.
pub fn test_verdict(outcomes: impl IntoIterator<Item = Outcome>) -> Verdict {
    outcomes
        .into_iter()
        .filter_map(|outcome| match outcome {
            Outcome::Pass | Outcome::Skip => None,
            Outcome::Warn => Some(Verdict::Warn),
            Outcome::Fail => Some(Verdict::Fail),
        })
        .max()
        .unwrap_or(Verdict::Pass)
}

/// Worst verdict over a suite's finished tests. Skipped tests contribute
/// nothing.
pub fn suite_verdict(verdicts: impl IntoIterator<Item = Verdict>) -> Verdict {
    verdicts.into_iter().max().unwrap_or(Verdict::Pass)
}

#[cfg(test)]
mod tests {
    use super::*;
    use Outcome::*;

    #[test]
    fn test_worst_of() {
        assert_eq!(test_verdict([Pass, Pass]), Verdict::Pass);
        assert_eq!(test_verdict([Pass, Warn]), Verdict::Warn);
        assert_eq!(test_verdict([Pass, Warn, Fail]), Verdict::Fail);
        assert_eq!(test_verdict([Skip]), Verdict::Pass);
        assert_eq!(test_verdict([Skip, Warn]), Verdict::Warn);
        assert_eq!(test_verdict([]), Verdict::Pass);
    }

    #[test]
    fn test_suite_verdict() {
        assert_eq!(suite_verdict([Verdict::Pass, Verdict::Warn]), Verdict::Warn);
        assert_eq!(suite_verdict([Verdict::Fail, Verdict::Pass]), Verdict::Fail);
        assert_eq!(suite_verdict([]), Verdict::Pass);
    }
}
