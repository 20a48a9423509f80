//! The Lambertian light model of the test rig: 36 LEDs in a 6x6 layout
//! hanging 176 cm above the floor.
//!
//! Used to build a synthetic fingerprint grid when no measured dataset is
//! at hand, and to move a measured reading from one floor point to another.

use crate::grid::IntensityGrid;
use crate::packet::LED_COUNT;

/// `(m + 3) / 2` for a Lambertian order `m = -ln 2 / ln cos(pi/12)`, i.e. a
/// 15 degree half-power angle. Applied to squared distances.
pub const LAMBERTIAN_EXPONENT: f32 = 11.496_864;

/// LED positions `(x, y, z)` in centimetres, row by row.
pub const TX_POSITIONS: [[f32; 3]; LED_COUNT] = [
    [22.605263, 17.605263, 176.0],
    [67.5, 19.0, 176.0],
    [118.865028, 16.09816, 176.0],
    [168.006027, 18.993977, 176.0],
    [216.4935, 17.983767, 176.0],
    [266.506836, 16.561644, 176.0],
    [21.426979, 71.896721, 176.0],
    [67.368919, 63.809563, 176.0],
    [116.055557, 71.0, 176.0],
    [166.5, 67.5, 176.0],
    [211.047363, 58.218948, 176.0],
    [274.5, 64.5, 176.0],
    [18.038462, 122.03846, 176.0],
    [68.235008, 121.258247, 176.0],
    [119.464584, 121.483471, 176.0],
    [169.911758, 122.0, 176.0],
    [218.5, 123.5, 176.0],
    [267.530243, 118.281517, 176.0],
    [17.875, 175.175003, 176.0],
    [69.693596, 172.700211, 176.0],
    [117.507927, 169.041992, 176.0],
    [171.5, 170.5, 176.0],
    [216.479691, 171.038071, 176.0],
    [271.150391, 170.267807, 176.0],
    [25.554163, 221.024033, 176.0],
    [56.968086, 227.989365, 176.0],
    [117.71627, 224.837616, 176.0],
    [169.467438, 223.916199, 176.0],
    [212.755722, 224.659302, 176.0],
    [268.287903, 223.020935, 176.0],
    [24.210526, 270.736847, 176.0],
    [67.481133, 268.51886, 176.0],
    [124.021873, 269.356567, 176.0],
    [173.34259, 269.314819, 176.0],
    [224.484451, 269.738739, 176.0],
    [268.758057, 271.953766, 176.0],
];

/// Squared distance from LED `led` to the floor point `(x, y)`.
fn squared_distance(x: f32, y: f32, led: usize) -> f32 {
    let [xl, yl, zl] = TX_POSITIONS[led];
    (x - xl).powi(2) + (y - yl).powi(2) + zl * zl
}

/// Estimates the intensity of LED `led` at `(x, y)` given a reading
/// `rss_ref` taken at `(x_ref, y_ref)`.
pub fn reconstruct_rss(rss_ref: f32, x: f32, y: f32, x_ref: f32, y_ref: f32, led: usize) -> f32 {
    let d = squared_distance(x, y, led);
    let d_ref = squared_distance(x_ref, y_ref, led);
    rss_ref * (d_ref / d).powf(LAMBERTIAN_EXPONENT)
}

/// Intensity of LED `led` at `(x, y)`, normalized to 1 directly beneath it.
pub fn intensity(x: f32, y: f32, led: usize) -> f32 {
    let zl = TX_POSITIONS[led][2];
    (zl * zl / squared_distance(x, y, led)).powf(LAMBERTIAN_EXPONENT)
}

/// A noiseless `height x width` grid with one centimetre cells, every cell
/// valid.
pub fn synthesize_grid(width: usize, height: usize) -> IntensityGrid {
    let mut data = Vec::with_capacity(width * height * LED_COUNT);
    for y in 0..height {
        for x in 0..width {
            data.extend((0..LED_COUNT).map(|led| intensity(x as f32, y as f32, led)));
        }
    }
    IntensityGrid::new(height, width, LED_COUNT, data).expect("buffer built to shape")
}
