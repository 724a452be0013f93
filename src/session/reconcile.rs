// Audio/video gap reconciliation
//
// Frames and audio run on independent clocks. Whenever the capture loop stalls
// (a slow tick, a blocked preview) no frame is recorded, yet the microphone
// keeps delivering audio. Those stalls show up as large steps between
// consecutive frame timestamps; audio captured inside a stall has no frames
// to play against and is cut so the saved audio stays aligned with the saved
// frames.

use crate::timeline::AudioChunk;

/// Frame-to-frame step (seconds) above which a stall is assumed
pub const DEFAULT_GAP_THRESHOLD_SECS: f64 = 0.1;

/// A stall between two consecutive frames, as `[start, end)` in epoch seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gap {
    pub start: f64,
    pub end: f64,
}

/// Reconciled audio and what was cut from it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciled {
    pub samples: Vec<f32>,
    pub gaps: Vec<Gap>,
    pub chunks_kept: usize,
    pub chunks_dropped: usize,
}

impl Reconciled {
    /// True when there is no audio to merge
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Every consecutive pair of frame timestamps further apart than `threshold`
pub fn find_gaps(frame_timestamps: &[f64], threshold: f64) -> Vec<Gap> {
    frame_timestamps
        .windows(2)
        .filter(|pair| pair[1] - pair[0] > threshold)
        .map(|pair| Gap {
            start: pair[0],
            end: pair[1],
        })
        .collect()
}

/// Indices of the chunks to keep: everything outside every gap. Assumes
/// `chunks` and `gaps` are both in time order.
pub fn select_chunks(chunks: &[AudioChunk], gaps: &[Gap]) -> Vec<usize> {
    let mut kept = Vec::with_capacity(chunks.len());
    let mut cursor = 0;

    for gap in gaps {
        while cursor < chunks.len() && chunks[cursor].capture_timestamp < gap.start {
            kept.push(cursor);
            cursor += 1;
        }
        while cursor < chunks.len() && chunks[cursor].capture_timestamp < gap.end {
            cursor += 1;
        }
    }
    kept.extend(cursor..chunks.len());
    kept
}

/// Cut the audio captured during frame stalls and concatenate the rest
pub fn reconcile_audio(frame_timestamps: &[f64], chunks: &[AudioChunk], threshold: f64) -> Reconciled {
    let gaps = find_gaps(frame_timestamps, threshold);
    let kept = select_chunks(chunks, &gaps);

    let total: usize = kept.iter().map(|&i| chunks[i].samples.len()).sum();
    let mut samples = Vec::with_capacity(total);
    for &i in &kept {
        samples.extend_from_slice(&chunks[i].samples);
    }

    if !gaps.is_empty() {
        log::debug!(
            "Reconciled audio: {} gaps, kept {} of {} chunks",
            gaps.len(),
            kept.len(),
            chunks.len()
        );
    }

    Reconciled {
        samples,
        chunks_kept: kept.len(),
        chunks_dropped: chunks.len() - kept.len(),
        gaps,
    }
}

/// Truncate interleaved samples to a whole number of frames
pub fn align_to_channels(samples: &mut Vec<f32>, channels: u16) {
    let channels = channels.max(1) as usize;
    let remainder = samples.len() % channels;
    if remainder != 0 {
        log::debug!("Dropping {} trailing samples to align channels", remainder);
        samples.truncate(samples.len() - remainder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(timestamp: f64) -> AudioChunk {
        AudioChunk {
            capture_timestamp: timestamp,
            samples: vec![timestamp as f32; 2],
        }
    }

    fn chunks(timestamps: &[f64]) -> Vec<AudioChunk> {
        timestamps.iter().copied().map(chunk).collect()
    }

    #[test]
    fn finds_the_stall_between_frames() {
        let gaps = find_gaps(&[0.0, 0.05, 0.3, 0.35], DEFAULT_GAP_THRESHOLD_SECS);
        assert_eq!(gaps, vec![Gap { start: 0.05, end: 0.3 }]);
    }

    #[test]
    fn a_step_equal_to_the_threshold_is_not_a_gap() {
        assert!(find_gaps(&[0.0, 0.5, 1.0], 0.5).is_empty());
        assert!(find_gaps(&[], 0.1).is_empty());
        assert!(find_gaps(&[1.0], 0.1).is_empty());
    }

    #[test]
    fn audio_inside_a_stall_is_cut() {
        let audio = chunks(&[0.0, 0.04, 0.1, 0.2, 0.32, 0.4]);
        let result = reconcile_audio(&[0.0, 0.05, 0.3, 0.35], &audio, DEFAULT_GAP_THRESHOLD_SECS);

        let expected: Vec<f32> = chunks(&[0.0, 0.04, 0.32, 0.4])
            .into_iter()
            .flat_map(|c| c.samples)
            .collect();
        assert_eq!(result.samples, expected);
        assert_eq!(result.chunks_kept, 4);
        assert_eq!(result.chunks_dropped, 2);
    }

    #[test]
    fn without_gaps_everything_is_kept_in_order() {
        let audio = chunks(&[0.0, 0.01, 0.02, 0.5]);
        let result = reconcile_audio(&[0.0, 0.03, 0.06, 0.09], &audio, DEFAULT_GAP_THRESHOLD_SECS);

        let expected: Vec<f32> = audio.iter().flat_map(|c| c.samples.clone()).collect();
        assert_eq!(result.samples, expected);
        assert!(result.gaps.is_empty());
    }

    #[test]
    fn gap_boundaries_are_half_open() {
        let audio = chunks(&[1.0, 2.0]);
        let kept = select_chunks(&audio, &[Gap { start: 1.0, end: 2.0 }]);
        assert_eq!(kept, vec![1]);
    }

    #[test]
    fn several_gaps_are_walked_in_one_pass() {
        let audio = chunks(&[0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0]);
        let gaps = [Gap { start: 0.4, end: 1.1 }, Gap { start: 2.0, end: 2.6 }];
        assert_eq!(select_chunks(&audio, &gaps), vec![0, 3, 6]);
    }

    #[test]
    fn no_audio_means_nothing_to_merge() {
        let result = reconcile_audio(&[0.0, 1.0], &[], DEFAULT_GAP_THRESHOLD_SECS);
        assert!(result.is_empty());
        assert_eq!(result.gaps.len(), 1);
    }

    #[test]
    fn no_frames_keeps_all_audio() {
        let audio = chunks(&[0.0, 0.1]);
        let result = reconcile_audio(&[], &audio, DEFAULT_GAP_THRESHOLD_SECS);
        assert_eq!(result.chunks_kept, 2);
    }

    #[test]
    fn channel_alignment_drops_partial_frames() {
        let mut samples = vec![0.0; 7];
        align_to_channels(&mut samples, 2);
        assert_eq!(samples.len(), 6);

        let mut mono = vec![0.0; 7];
        align_to_channels(&mut mono, 0);
        assert_eq!(mono.len(), 7);
    }
}
