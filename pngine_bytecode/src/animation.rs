//! The animation scene table.
//!
//! When the header sets [`crate::FLAG_HAS_ANIMATION_TABLE`], the first four
//! bytes of the data section hold the table's offset relative to the data
//! section start. The table maps time intervals onto frames so the VM can
//! pick which frame's opcode subsequence to replay:
//!
//! ```text
//!   count:u16  end_behavior:u8  pad:u8
//!   count × { scene:u16  frame:u16  frame_off:u32  start:f32  end:f32 }
//! ```
//!
//! Records are sorted by `(start, scene)` and times are seconds. Each
//! record carries the byte offset of its frame's subsequence within the
//! bytecode section, so selection never needs a separate frame table.

use crate::bytes::{Reader, Writer};
use crate::descriptor::WireError;
use crate::wire::EndBehavior;

/// One `[start, end)` interval mapped to a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scene {
    /// Declaration-order scene id; the tie-break for overlapping starts.
    pub scene: u16,
    /// The frame this scene plays.
    pub frame: u16,
    /// Byte offset of the frame's opcode subsequence in the bytecode.
    pub frame_off: u32,
    /// Interval start in seconds, inclusive.
    pub start: f32,
    /// Interval end in seconds, exclusive.
    pub end: f32,
}

/// The module's timeline: every scene plus the out-of-range behavior.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimationTable {
    pub scenes: Vec<Scene>,
    pub end_behavior: EndBehavior,
}

impl Default for EndBehavior {
    fn default() -> Self {
        EndBehavior::Hold
    }
}

impl AnimationTable {
    /// Seconds covered by the timeline: the maximum scene end.
    pub fn total(&self) -> f32 {
        self.scenes.iter().fold(0.0, |acc, s| acc.max(s.end))
    }

    /// Select the scene active at `time`, applying the end behavior when
    /// `time` runs past the covered range.
    ///
    /// Returns `None` when no scene covers the (possibly wrapped) instant:
    /// either the timeline has stopped, or the instant falls in a gap.
    pub fn select(&self, time: f32) -> Option<&Scene> {
        if self.scenes.is_empty() {
            return None;
        }
        let total = self.total();
        let t = if time >= total {
            match self.end_behavior {
                EndBehavior::Hold => {
                    // Hold the scene with the latest start; the earlier
                    // declared one wins among equals. Ascending
                    // `(start, scene)` order puts that winner at the
                    // front of the maximal-start run, not at `last()`.
                    let max_start = self.scenes.last()?.start;
                    return self.scenes.iter().find(|s| s.start == max_start);
                }
                EndBehavior::Loop => {
                    if total <= 0.0 {
                        return None;
                    }
                    time % total
                }
                EndBehavior::Stop => return None,
            }
        } else {
            time
        };
        self.lookup(t)
    }

    // Binary search over the sorted `(start, scene)` records. Overlaps
    // resolve to the earlier-declared scene.
    fn lookup(&self, t: f32) -> Option<&Scene> {
        let idx = self
            .scenes
            .partition_point(|s| s.start <= t)
            .checked_sub(1)?;
        // Walk left so an earlier-declared overlapping scene wins.
        let mut best: Option<&Scene> = None;
        for scene in self.scenes[..=idx].iter().rev() {
            if scene.start <= t && t < scene.end {
                match best {
                    Some(b) if b.scene <= scene.scene => {}
                    _ => best = Some(scene),
                }
            }
        }
        best
    }

    pub fn encode(&self, w: &mut Writer) {
        w.u16(self.scenes.len() as u16);
        w.u8(self.end_behavior.to_wire());
        w.u8(0);
        for scene in &self.scenes {
            w.u16(scene.scene);
            w.u16(scene.frame);
            w.u32(scene.frame_off);
            w.f32(scene.start);
            w.f32(scene.end);
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<AnimationTable, WireError> {
        let mut r = Reader::new(bytes);
        let count = r.u16().ok_or(WireError::UnexpectedEnd)?;
        let behavior_byte = r.u8().ok_or(WireError::UnexpectedEnd)?;
        let end_behavior =
            EndBehavior::from_wire(behavior_byte).ok_or(WireError::UnknownEnumValue {
                what: "EndBehavior",
                value: behavior_byte,
            })?;
        let _pad = r.u8().ok_or(WireError::UnexpectedEnd)?;
        let mut scenes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            scenes.push(Scene {
                scene: r.u16().ok_or(WireError::UnexpectedEnd)?,
                frame: r.u16().ok_or(WireError::UnexpectedEnd)?,
                frame_off: r.u32().ok_or(WireError::UnexpectedEnd)?,
                start: r.f32().ok_or(WireError::UnexpectedEnd)?,
                end: r.f32().ok_or(WireError::UnexpectedEnd)?,
            });
        }
        Ok(AnimationTable {
            scenes,
            end_behavior,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_scene_table(end_behavior: EndBehavior) -> AnimationTable {
        AnimationTable {
            scenes: vec![
                Scene { scene: 0, frame: 0, frame_off: 0, start: 0.0, end: 10.0 },
                Scene { scene: 1, frame: 1, frame_off: 64, start: 10.0, end: 20.0 },
                Scene { scene: 2, frame: 2, frame_off: 128, start: 20.0, end: 30.0 },
            ],
            end_behavior,
        }
    }

    #[test]
    fn selects_by_interval() {
        let table = three_scene_table(EndBehavior::Hold);
        assert_eq!(table.select(0.0).unwrap().scene, 0);
        assert_eq!(table.select(12.0).unwrap().scene, 1);
        assert_eq!(table.select(29.9).unwrap().scene, 2);
    }

    #[test]
    fn hold_keeps_the_last_scene() {
        let table = three_scene_table(EndBehavior::Hold);
        assert_eq!(table.select(35.0).unwrap().scene, 2);
    }

    #[test]
    fn loop_wraps_modulo_total() {
        let table = three_scene_table(EndBehavior::Loop);
        // 35 mod 30 = 5 lands in the first scene.
        assert_eq!(table.select(35.0).unwrap().scene, 0);
    }

    #[test]
    fn stop_selects_nothing_past_the_end() {
        let table = three_scene_table(EndBehavior::Stop);
        assert!(table.select(30.0).is_none());
    }

    #[test]
    fn ties_prefer_the_earlier_declared_scene() {
        let table = AnimationTable {
            scenes: vec![
                Scene { scene: 0, frame: 0, frame_off: 0, start: 0.0, end: 10.0 },
                Scene { scene: 1, frame: 1, frame_off: 64, start: 0.0, end: 10.0 },
            ],
            end_behavior: EndBehavior::Hold,
        };
        assert_eq!(table.select(5.0).unwrap().scene, 0);
    }

    #[test]
    fn hold_ties_prefer_the_earlier_declared_scene() {
        // Two scenes share the maximal start; holding past the end must
        // keep the earlier-declared one, not whichever sorts last.
        let table = AnimationTable {
            scenes: vec![
                Scene { scene: 0, frame: 0, frame_off: 0, start: 0.0, end: 20.0 },
                Scene { scene: 1, frame: 1, frame_off: 64, start: 20.0, end: 30.0 },
                Scene { scene: 2, frame: 2, frame_off: 128, start: 20.0, end: 25.0 },
            ],
            end_behavior: EndBehavior::Hold,
        };
        assert_eq!(table.select(40.0).unwrap().scene, 1);
    }

    #[test]
    fn gaps_select_nothing() {
        let table = AnimationTable {
            scenes: vec![
                Scene { scene: 0, frame: 0, frame_off: 0, start: 0.0, end: 5.0 },
                Scene { scene: 1, frame: 1, frame_off: 64, start: 10.0, end: 15.0 },
            ],
            end_behavior: EndBehavior::Hold,
        };
        assert!(table.select(7.0).is_none());
    }

    #[test]
    fn encode_decode_round_trip() {
        let table = three_scene_table(EndBehavior::Loop);
        let mut w = Writer::new();
        table.encode(&mut w);
        let decoded = AnimationTable::decode(&w.into_bytes()).unwrap();
        assert_eq!(decoded, table);
    }
}
