//! Field delimiter detection for character-separated files.
//!
//! Candidates are scored over a prefix of the decoded text by counting
//! occurrences outside double-quoted spans on each line. The winner is
//! the candidate present on the most lines with the most stable per-line
//! count (lowest variance); ties fall back to the candidate order.

use talentmap_protocol::{PipelineError, PipelineResult};

/// Candidate delimiters in tie-break priority order.
pub const CANDIDATES: [char; 4] = ['|', ',', '\t', ';'];

/// Lines inspected for detection.
const SAMPLE_LINES: usize = 100;

#[derive(Debug)]
struct Score {
    delimiter: char,
    /// Lines on which the delimiter occurs at least once.
    presence: usize,
    /// Variance of the per-line occurrence counts (all sampled lines).
    variance: f64,
}

/// Detect the delimiter of `text`. A file where no candidate ever
/// occurs is treated as a single-column CSV and reported as comma.
pub fn detect(text: &str) -> PipelineResult<char> {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SAMPLE_LINES)
        .collect();
    if lines.is_empty() {
        return Ok(',');
    }

    let mut unbalanced = 0usize;
    let mut counts_per_line: Vec<Option<[usize; 4]>> = Vec::with_capacity(lines.len());
    for line in &lines {
        match count_outside_quotes(line) {
            Some(counts) => counts_per_line.push(Some(counts)),
            None => {
                unbalanced += 1;
                counts_per_line.push(None);
            }
        }
    }
    if unbalanced * 2 > lines.len() {
        return Err(PipelineError::DelimiterError {
            attempted: "','".to_string(),
        });
    }

    let balanced: Vec<[usize; 4]> = counts_per_line.into_iter().flatten().collect();
    let mut scores: Vec<Score> = CANDIDATES
        .iter()
        .enumerate()
        .map(|(slot, &delimiter)| {
            let counts: Vec<usize> = balanced.iter().map(|c| c[slot]).collect();
            let presence = counts.iter().filter(|c| **c > 0).count();
            Score {
                delimiter,
                presence,
                variance: variance(&counts),
            }
        })
        .collect();

    // Stable sort keeps the candidate priority order for exact ties.
    scores.sort_by(|a, b| {
        b.presence
            .cmp(&a.presence)
            .then_with(|| a.variance.partial_cmp(&b.variance).unwrap_or(std::cmp::Ordering::Equal))
    });

    let best = &scores[0];
    tracing::debug!(
        delimiter = %best.delimiter.escape_debug(),
        presence = best.presence,
        variance = best.variance,
        "detected delimiter"
    );
    if best.presence == 0 {
        // Single-column file.
        return Ok(',');
    }
    Ok(best.delimiter)
}

/// Count each candidate outside balanced double-quote spans.
/// Returns None when the line ends inside a quote.
fn count_outside_quotes(line: &str) -> Option<[usize; 4]> {
    let mut counts = [0usize; 4];
    let mut in_quotes = false;
    for ch in line.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }
        if !in_quotes {
            if let Some(slot) = CANDIDATES.iter().position(|c| *c == ch) {
                counts[slot] += 1;
            }
        }
    }
    (!in_quotes).then_some(counts)
}

fn variance(counts: &[usize]) -> f64 {
    if counts.is_empty() {
        return 0.0;
    }
    let n = counts.len() as f64;
    let mean = counts.iter().sum::<usize>() as f64 / n;
    counts
        .iter()
        .map(|c| {
            let diff = *c as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_separated() {
        let text = "a,b,c\n1,2,3\n4,5,6\n";
        assert_eq!(detect(text).unwrap(), ',');
    }

    #[test]
    fn pipe_separated() {
        let text = "PersonID|FirstName|LastName\n1|Ada|Lovelace\n2|Grace|Hopper\n";
        assert_eq!(detect(text).unwrap(), '|');
    }

    #[test]
    fn tab_separated() {
        let text = "a\tb\tc\n1\t2\t3\n";
        assert_eq!(detect(text).unwrap(), '\t');
    }

    #[test]
    fn semicolon_separated() {
        let text = "a;b;c\n1;2;3\n";
        assert_eq!(detect(text).unwrap(), ';');
    }

    #[test]
    fn quoted_commas_do_not_fool_pipe_detection() {
        let text = "id|note\n1|\"a, b, c\"\n2|\"d, e\"\n3|plain\n";
        assert_eq!(detect(text).unwrap(), '|');
    }

    #[test]
    fn stable_count_beats_noisy_count() {
        // Commas: 2 per line on every line. Semicolons: erratic.
        let text = "a,b;c,d\n1,2,3\n4,5;;;6\n7,8,9\n";
        assert_eq!(detect(text).unwrap(), ',');
    }

    #[test]
    fn single_column_defaults_to_comma() {
        let text = "name\nAda\nGrace\n";
        assert_eq!(detect(text).unwrap(), ',');
    }

    #[test]
    fn pervasive_unbalanced_quotes_error() {
        let text = "a,\"b\n1,\"2\n3,\"4\n";
        let err = detect(text).unwrap_err();
        assert!(matches!(err, PipelineError::DelimiterError { .. }));
    }
}
