#![no_main]

use cliploop::model::{Clip, ClipId};
use cliploop::sequencer;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&len, ops)) = data.split_first() else {
        return;
    };
    let clips: Vec<Clip> = (0..u64::from(len % 32))
        .map(|n| Clip::new(ClipId(n * 3 + 1), format!("clip {n}"), format!("/clips/{n}.mp4")))
        .collect();
    let active: Vec<&Clip> = clips.iter().collect();

    let mut last = None;
    for byte in ops {
        if byte % 7 == 0 {
            // Marker pointing at an id that may not exist.
            last = Some(ClipId(u64::from(*byte)));
        }
        match sequencer::next(&active, last) {
            Ok(clip) => {
                assert!(active.iter().any(|candidate| candidate.id == clip.id));
                last = Some(clip.id);
            }
            Err(_) => assert!(active.is_empty()),
        }
    }
});
