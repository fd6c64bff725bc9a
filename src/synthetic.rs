//! Synthetic hand landmark sets for demos and tests.

use crate::gesture::{INDEX_TIP, THUMB_TIP};
use crate::types::Landmark;

/// Open hand, wrist at the bottom, wrist to middle-knuckle distance 0.3.
/// The index knuckle is left of the pinky knuckle, so the hand faces the
/// camera front-on when mirrored.
pub fn open_hand() -> Vec<Landmark> {
    [
        (0.50, 0.80), // wrist
        (0.42, 0.74),
        (0.36, 0.66),
        (0.32, 0.58),
        (0.28, 0.50), // thumb tip
        (0.44, 0.52), // index base
        (0.43, 0.42),
        (0.42, 0.35),
        (0.41, 0.28), // index tip
        (0.50, 0.50), // middle base
        (0.50, 0.40),
        (0.50, 0.32),
        (0.50, 0.24), // middle tip
        (0.56, 0.52),
        (0.57, 0.42),
        (0.575, 0.35),
        (0.58, 0.28), // ring tip
        (0.61, 0.56), // pinky base
        (0.63, 0.48),
        (0.645, 0.42),
        (0.66, 0.36), // pinky tip
    ]
    .iter()
    .map(|&(x, y)| Landmark::new(x, y, 0.0))
    .collect()
}

/// [`open_hand`] with the thumb tip `distance` to the left of the index tip.
pub fn pinching_hand(distance: f32) -> Vec<Landmark> {
    let mut hand = open_hand();
    let index = hand[INDEX_TIP];
    hand[THUMB_TIP] = Landmark::new(index.x - distance, index.y, 0.0);
    hand
}
