//! Frame ranges as the host render planner prints them and as the job
//! template consumes them.

use std::fmt::Display;

use crate::error::ExtractError;

/// A contiguous frame range with a uniform stride.
///
/// Invariant: `start <= stop` and `step >= 1`. A single frame is
/// `start == stop` with `step == 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRange {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl FrameRange {
    pub fn new(start: i64, stop: i64, step: i64) -> Result<Self, ExtractError> {
        if start > stop || step < 1 {
            return Err(ExtractError::InvalidFrameRange { start, stop, step });
        }

        Ok(Self { start, stop, step })
    }

    pub fn single(frame: i64) -> Self {
        Self {
            start: frame,
            stop: frame,
            step: 1,
        }
    }

    /// Parses the planner notation: `( f )` or `( start stop step )`.
    pub fn parse_planner(text: &str) -> Result<Self, ExtractError> {
        let malformed = || ExtractError::MalformedFrameRange(text.to_string());

        let inner = text
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(malformed)?;

        let ints = inner
            .split_whitespace()
            .map(|token| token.parse::<i64>().map_err(|_| malformed()))
            .collect::<Result<Vec<_>, _>>()?;

        match ints[..] {
            [frame] => Ok(Self::single(frame)),
            [start, stop, step] => Self::new(start, stop, step),
            _ => Err(malformed()),
        }
    }

    /// Parses the textual expression `a`, `a-b` or `a-b:c`.
    pub fn parse_expression(text: &str) -> Result<Self, ExtractError> {
        let malformed = || ExtractError::MalformedExpression(text.to_string());
        let int = |s: &str| s.trim().parse::<i64>().map_err(|_| malformed());

        let (range, step) = match text.split_once(':') {
            Some((range, step)) => (range, Some(int(step)?)),
            None => (text, None),
        };

        // The leading character may be a minus sign of a negative start frame.
        let split = range
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c == '-')
            .map(|(i, _)| i);

        match (split, step) {
            (Some(i), step) => Self::new(int(&range[..i])?, int(&range[i + 1..])?, step.unwrap_or(1)),
            (None, None) => Ok(Self::single(int(range)?)),
            (None, Some(_)) => Err(malformed()),
        }
    }

    /// The textual expression `"{start}-{stop}:{step}"`.
    pub fn expression(&self) -> String {
        format!("{}-{}:{}", self.start, self.stop, self.step)
    }

    /// Every frame in the range, in order.
    pub fn frames(&self) -> Vec<i64> {
        (self.start..=self.stop)
            .step_by(self.step as usize)
            .collect()
    }
}

impl Display for FrameRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expression())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_planner() {
        assert_eq!(
            FrameRange::parse_planner("( 1 10 1 )").unwrap(),
            FrameRange::new(1, 10, 1).unwrap()
        );
        assert_eq!(
            FrameRange::parse_planner("( 1 240 4 )").unwrap(),
            FrameRange::new(1, 240, 4).unwrap()
        );

        // Single frame reduces to a one-frame range
        assert_eq!(FrameRange::parse_planner("( 7 )").unwrap(), FrameRange::single(7));
        assert_eq!(
            FrameRange::parse_planner("( -3 )").unwrap(),
            FrameRange::new(-3, -3, 1).unwrap()
        );
    }

    #[test]
    fn test_parse_planner_malformed() {
        for text in ["( 1 10 )", "( )", "1 10 1", "( 1 10 1 2 )", "( a )", "( 1.5 )"] {
            assert!(
                matches!(
                    FrameRange::parse_planner(text),
                    Err(ExtractError::MalformedFrameRange(_))
                ),
                "{text}"
            );
        }
    }

    #[test]
    fn test_parse_planner_invalid() {
        assert!(matches!(
            FrameRange::parse_planner("( 10 1 1 )"),
            Err(ExtractError::InvalidFrameRange { .. })
        ));
        assert!(matches!(
            FrameRange::parse_planner("( 1 10 0 )"),
            Err(ExtractError::InvalidFrameRange { .. })
        ));
    }

    #[test]
    fn test_expression_reparse() {
        for (start, stop, step) in [(1, 10, 1), (1, 240, 4), (-20, -5, 5), (1001, 1001, 1)] {
            let range = FrameRange::new(start, stop, step).unwrap();
            assert_eq!(FrameRange::parse_expression(&range.expression()).unwrap(), range);
        }
    }

    #[test]
    fn test_parse_expression_short_forms() {
        assert_eq!(FrameRange::parse_expression("5").unwrap(), FrameRange::single(5));
        assert_eq!(
            FrameRange::parse_expression("1-4").unwrap(),
            FrameRange::new(1, 4, 1).unwrap()
        );
        assert!(FrameRange::parse_expression("5:2").is_err());
        assert!(FrameRange::parse_expression("x-4").is_err());
    }

    #[test]
    fn test_frames() {
        assert_eq!(FrameRange::new(1, 10, 3).unwrap().frames(), vec![1, 4, 7, 10]);
        assert_eq!(FrameRange::new(1, 9, 3).unwrap().frames(), vec![1, 4, 7]);
        assert_eq!(FrameRange::single(12).frames(), vec![12]);
        assert_eq!(FrameRange::new(-2, 2, 2).unwrap().frames(), vec![-2, 0, 2]);
    }
}
