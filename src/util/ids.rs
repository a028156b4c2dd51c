//! Player id generation

use rand::Rng;

/// Random session player id, `user` followed by a five digit number
pub fn random_player_id() -> String {
    random_player_id_with(&mut rand::thread_rng())
}

pub fn random_player_id_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("user{}", rng.gen_range(10_000..100_000))
}
