//! Containment alignment of word timestamps against speaker segments.
//!
//! A word belongs to a segment only when its full span lies inside the
//! segment span. Words crossing a segment boundary are dropped, not split;
//! this is a greedy approximation, not a global assignment.

/// One transcribed token with timestamps relative to the window start.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// One diarization interval. Labels are local to the window that produced
/// them; the same human may get a different label in the next window.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerSegment {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

/// All text attributed to one speaker within a single window.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerLine {
    pub speaker: String,
    pub text: String,
}

/// Merge word timestamps with speaker segments into per-speaker lines.
///
/// Segments are visited in input order. Each word is assigned to the first
/// segment that fully contains it, so a word never appears in more than one
/// line even when segments overlap. Within one segment the matched words are
/// concatenated without separators; utterances from later segments of the
/// same speaker are joined with a single space. Speakers appear in order of
/// their first segment; a speaker whose segments matched no words is omitted.
pub fn align(words: &[Word], segments: &[SpeakerSegment]) -> Vec<SpeakerLine> {
    let mut consumed = vec![false; words.len()];
    // (speaker, utterances) in order of first segment appearance
    let mut speakers: Vec<(String, Vec<String>)> = Vec::new();

    for segment in segments {
        if !speakers.iter().any(|(s, _)| *s == segment.speaker) {
            speakers.push((segment.speaker.clone(), Vec::new()));
        }

        let mut utterance = String::new();
        for (idx, word) in words.iter().enumerate() {
            if consumed[idx] {
                continue;
            }
            if word.start >= segment.start && word.end <= segment.end {
                utterance.push_str(&word.text);
                consumed[idx] = true;
            }
        }

        if !utterance.is_empty() {
            let slot = speakers
                .iter_mut()
                .find(|(s, _)| *s == segment.speaker)
                .expect("speaker slot registered above");
            slot.1.push(utterance);
        }
    }

    speakers
        .into_iter()
        .filter(|(_, utterances)| !utterances.is_empty())
        .map(|(speaker, utterances)| SpeakerLine {
            speaker,
            text: utterances.join(" "),
        })
        .collect()
}

/// Render aligned lines as the emitted text chunk, one `[speaker]: text`
/// line per speaker. Empty input renders as an empty string.
pub fn format_lines(lines: &[SpeakerLine]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&format!("[{}]: {}\n", line.speaker, line.text));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f64, end: f64) -> Word {
        Word {
            text: text.to_string(),
            start,
            end,
        }
    }

    fn segment(start: f64, end: f64, speaker: &str) -> SpeakerSegment {
        SpeakerSegment {
            start,
            end,
            speaker: speaker.to_string(),
        }
    }

    #[test]
    fn single_word_in_single_segment() {
        let lines = align(&[word("ok", 0.0, 0.5)], &[segment(0.0, 1.0, "S0")]);
        assert_eq!(
            lines,
            vec![SpeakerLine {
                speaker: "S0".to_string(),
                text: "ok".to_string()
            }]
        );
    }

    #[test]
    fn word_spanning_boundary_is_dropped() {
        let words = [word("a", 0.0, 0.5), word("b", 0.6, 1.5)];
        let lines = align(&words, &[segment(0.0, 1.0, "S0")]);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].speaker, "S0");
        assert_eq!(lines[0].text, "a");
    }

    #[test]
    fn no_words_means_no_lines() {
        let lines = align(&[], &[segment(0.0, 1.0, "S0")]);
        assert!(lines.is_empty());
    }

    #[test]
    fn no_segments_means_no_lines() {
        let lines = align(&[word("a", 0.0, 0.5)], &[]);
        assert!(lines.is_empty());
    }

    #[test]
    fn words_concatenate_without_separator_in_order() {
        let words = [
            word("こん", 0.0, 0.3),
            word("にち", 0.3, 0.6),
            word("は", 0.6, 0.9),
        ];
        let lines = align(&words, &[segment(0.0, 1.0, "S0")]);
        assert_eq!(lines[0].text, "こんにちは");
    }

    #[test]
    fn overlapping_segments_claim_a_word_once() {
        let words = [word("x", 1.0, 1.5)];
        let segments = [segment(0.5, 2.0, "S0"), segment(0.8, 2.5, "S1")];
        let lines = align(&words, &segments);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].speaker, "S0");
        assert_eq!(lines[0].text, "x");
    }

    #[test]
    fn speakers_ordered_by_first_segment_appearance() {
        let words = [
            word("a", 0.1, 0.4),
            word("b", 1.1, 1.4),
            word("c", 2.1, 2.4),
        ];
        let segments = [
            segment(0.0, 0.5, "S1"),
            segment(1.0, 1.5, "S0"),
            segment(2.0, 2.5, "S1"),
        ];
        let lines = align(&words, &segments);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].speaker, "S1");
        assert_eq!(lines[0].text, "a c");
        assert_eq!(lines[1].speaker, "S0");
        assert_eq!(lines[1].text, "b");
    }

    #[test]
    fn speaker_with_no_matched_words_is_omitted() {
        let words = [word("a", 0.1, 0.4)];
        let segments = [segment(0.0, 0.5, "S0"), segment(5.0, 6.0, "S1")];
        let lines = align(&words, &segments);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].speaker, "S0");
    }

    #[test]
    fn align_is_pure() {
        let words = [word("a", 0.1, 0.4), word("b", 0.5, 0.9)];
        let segments = [segment(0.0, 1.0, "S0")];
        let first = align(&words, &segments);
        let second = align(&words, &segments);
        assert_eq!(first, second);
    }

    #[test]
    fn format_renders_one_line_per_speaker() {
        let lines = vec![
            SpeakerLine {
                speaker: "SPEAKER_00".to_string(),
                text: "hello".to_string(),
            },
            SpeakerLine {
                speaker: "SPEAKER_01".to_string(),
                text: "world".to_string(),
            },
        ];
        assert_eq!(
            format_lines(&lines),
            "[SPEAKER_00]: hello\n[SPEAKER_01]: world\n"
        );
    }

    #[test]
    fn format_of_nothing_is_empty() {
        assert_eq!(format_lines(&[]), "");
    }

    #[test]
    fn word_exactly_filling_segment_matches() {
        let lines = align(&[word("a", 0.0, 1.0)], &[segment(0.0, 1.0, "S0")]);
        assert_eq!(lines[0].text, "a");
    }
}
