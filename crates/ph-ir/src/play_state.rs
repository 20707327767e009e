//! Play state of a generator and the multi-input resolution rule.

/// Whether a generator still has potentially audible output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PlayState {
    /// Has not produced anything audible yet.
    #[default]
    NotStarted,
    /// Producing, or about to produce, audible output.
    Playing,
    /// Silent now and forever.
    Finished,
    /// Produces the same class of output forever (oscillators, noise, DC).
    Constant,
}

impl PlayState {
    /// Whether a voice holding this state must keep being rendered.
    pub fn is_playing(self) -> bool {
        self == PlayState::Playing
    }
}

/// Combine the states of several inputs into the state of their combination.
///
/// Precedence: any `Playing` wins; otherwise any `Finished` silences the
/// combination permanently; otherwise all `NotStarted` stays `NotStarted`;
/// otherwise any `Constant` makes the result `Constant`.
///
/// A combination with no inputs is silent forever and resolves to `Constant`.
pub fn resolve<I>(states: I) -> PlayState
where
    I: IntoIterator<Item = PlayState>,
{
    let mut any = false;
    let mut finished = false;
    let mut all_not_started = true;
    let mut constant = false;
    for state in states {
        any = true;
        match state {
            PlayState::Playing => return PlayState::Playing,
            PlayState::Finished => finished = true,
            PlayState::NotStarted => {}
            PlayState::Constant => constant = true,
        }
        if state != PlayState::NotStarted {
            all_not_started = false;
        }
    }
    if !any {
        return PlayState::Constant;
    }
    if finished {
        PlayState::Finished
    } else if all_not_started {
        PlayState::NotStarted
    } else if constant {
        PlayState::Constant
    } else {
        PlayState::Playing
    }
}
