//! Protocol codenames by epoch, used for the `min_protocol_version` selector
//! and variant ids.

/// `(first_epoch, codename)` pairs in ascending order. An upgrade at height
/// `h` takes effect from `h + 1`.
const PROTOCOL_CODENAMES: &[(i64, &str)] = &[
    (0, "genesis"),
    (41_280 + 1, "breeze"),
    (51_000 + 1, "smoke"),
    (94_000 + 1, "ignition"),
    (130_800 + 1, "refuel"),
    (138_720 + 1, "actorsv2"),
    (140_760 + 1, "tape"),
    (148_888 + 1, "liftoff"),
    (170_000 + 1, "postliftoff"),
    (265_200 + 1, "calico"),
    (272_400 + 1, "persian"),
    (336_458 + 1, "orange"),
    (550_321 + 1, "trust"),
    (665_280 + 1, "norwegian"),
    (712_320 + 1, "turbo"),
    (892_800 + 1, "hyperdrive"),
    (1_231_620 + 1, "chocolate"),
    (1_594_680 + 1, "ohsnap"),
    (1_960_320 + 1, "skyr"),
    (2_383_680 + 1, "shark"),
    (2_683_348 + 1, "hygge"),
    (2_809_800 + 1, "lightning"),
    (2_870_280 + 1, "thunder"),
    (3_469_380 + 1, "watermelon"),
    (3_855_360 + 1, "dragon"),
];

/// Codename of the protocol active at `height`.
pub fn protocol_codename(height: i64) -> &'static str {
    PROTOCOL_CODENAMES
        .iter()
        .take_while(|(first_epoch, _)| *first_epoch <= height)
        .last()
        .map(|(_, name)| *name)
        .unwrap_or(PROTOCOL_CODENAMES[0].1)
}
