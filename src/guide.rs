//! How the bench and the Pico talk to each other, and how a typical
//! session goes.
//!
//!
//! # Background
//!
//! The positioning rig has 36 LEDs mounted on a ceiling, each modulated so
//! a photodiode on the floor can tell their contributions apart. One
//! reading of the photodiode therefore gives one received signal strength
//! (RSS) per LED. A survey of the floor, taken on a grid with 10 mm between
//! cells, is stored as a `(height, width, 36)` array in a `.npy` file. Cells
//! that could not be measured have `-1` in place of the first LED's reading
//! and are never sampled.
//!
//! A small network is trained on that survey, quantized to int8, and
//! compiled into the Pico's firmware. The firmware waits on its USB serial
//! port for sensor vectors and answers each one with a position.
//!
//! LEDs lose brightness as they age. The lifetime of an LED is usually
//! given as its R90, the number of hours until it is down to 90% of its
//! initial output, and the decay in between is close to exponential. The
//! bench draws an R90 for every LED, dims the survey accordingly at a
//! series of timesteps, and records how much worse the predictions get.
//!
//!
//! # Wire protocol
//!
//! The link is a plain serial port, 9600 baud by default. Every exchange is
//! one request and one response, both fixed size and little-endian.
//!
//! A request is 145 bytes:
//!
//! | offset | size | content                                         |
//! |--------|------|-------------------------------------------------|
//! | 0      | 1    | `1` to score this vector, `0` for warmup         |
//! | 1      | 144  | 36 `f32` intensities, normalised to unit length |
//!
//! A response is 8 bytes: the predicted `x` then `y`, as `f32`, in
//! millimetres.
//!
//! The firmware answers warmup requests as well, so the host reads one
//! response per request no matter the flag, and simply drops the warmup
//! answers. Skipping those reads would leave stale positions in the
//! port's buffer and shift every later answer by one.
//!
//! See [crate::packet] for the codec and [crate::link] for the exchange.
//!
//!
//! # Aging run
//!
//! 1.  Load the survey ([crate::grid]), or synthesize one from the
//!     Lambertian model of the rig ([crate::lambertian]) when no survey is
//!     at hand.
//!
//! 2.  Draw an R90 for every LED between 10,000 and 50,000 hours, turn it
//!     into a decay constant `k = ln(1/0.9) / R90`, and compute the
//!     relative brightness `exp(-k t)` of every LED at every timestep,
//!     plus some Gaussian noise ([crate::aging]).
//!
//! 3.  For every timestep draw a batch of warmup samples from valid cells
//!     and dim them, and draw one test set that is dimmed again at each
//!     timestep.
//!
//! 4.  At each timestep, send the warmup batch, then the test set, and
//!     record the mean Euclidean error between the answers and the true
//!     locations ([crate::experiment]).
//!
//! ```text
//! vlp-bench aging --src dataset/grid.npy --port /dev/ttyACM0
//! vlp-bench aging --synthetic 100x80 --simulate --time 20000 --timestep 500
//! ```
//!
//! Every random draw comes from one generator seeded with `--seed`, so two
//! runs with the same arguments send exactly the same packets.
//!
//! The test set can be saved with `--export-test-set` and later scored
//! again, without aging, by `vlp-bench replay`. The file starts with a RON
//! header describing where the samples came from and the configuration of
//! the run, then a `0xFF` byte, then the samples as little-endian `f32`
//! values ([crate::sample_file]).
//!
//!
//! # Without hardware
//!
//! `--simulate` (or `--simulate-from` when replaying) swaps the serial port
//! for [crate::simulated_device::SimulatedPico], which speaks the same
//! protocol and answers with the location of the most similar fingerprint
//! in the survey. It has no notion of aging, so its error curve shows how
//! much the dimming alone moves a nearest-neighbour estimate.
//!
//!
//! # Deploying a model
//!
//! The firmware links the model in as a byte array. `vlp-bench embed`
//! writes that array, named after the model file:
//!
//! ```text
//! vlp-bench embed --input model_int8.tflite --out model_int8.c
//! ```
//!
//! produces `unsigned char model_int8_tflite[]` and
//! `unsigned int model_int8_tflite_len` ([crate::c_array]).
