use hivebot_dispatch::{CommandMsg, Handler, Plugin};
use hivebot_slack::CommandResponse;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

pub const PLUGIN_ID: &str = "random";

const DEFAULT_ROLL_MAX: i64 = 100;
const MAX_DICE_PER_GROUP: u32 = 100;

/// `NdM` with an optional `+K` modifier.
static DICE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]+)[dD]([0-9]+)(?:[+]([0-9]+))?").expect("dice pattern is valid")
});

pub fn plugin() -> Plugin {
    Plugin::new(PLUGIN_ID)
        .command(Handler::named("roll", |mut msg: CommandMsg| async move {
            let response = roll(&msg.command.text, &mut rand::thread_rng());
            msg.reply_with(response);
        }))
        .command(Handler::named("choose", |mut msg: CommandMsg| async move {
            let response = choose(&msg.command.text, &mut rand::thread_rng());
            msg.reply_with(response);
        }))
        .command(Handler::named("dice", |mut msg: CommandMsg| async move {
            let response = dice(&msg.command.text, &mut rand::thread_rng());
            msg.reply_with(response);
        }))
}

/// A number from 0 to `max` inclusive; `max` defaults to 100.
pub fn roll(text: &str, rng: &mut impl Rng) -> CommandResponse {
    let text = text.trim();
    let max = if text.is_empty() {
        DEFAULT_ROLL_MAX
    } else {
        match text.parse::<i64>() {
            Ok(max) if max >= 0 => max,
            _ => return CommandResponse::ephemeral(format!("Sorry '{text}' isn't a valid number.")),
        }
    };
    CommandResponse::in_channel(format!("You rolled a {}!", rng.gen_range(0..=max)))
}

/// Picks one of a comma separated list.
pub fn choose(text: &str, rng: &mut impl Rng) -> CommandResponse {
    let choices: Vec<&str> =
        text.split(',').map(str::trim).filter(|choice| !choice.is_empty()).collect();
    match choices.as_slice() {
        [] => CommandResponse::ephemeral(
            "I can't make a choice for you if you don't give me any choices!",
        ),
        [only] => CommandResponse::in_channel(format!("Well I guess I *have* to choose {only}.")),
        _ => CommandResponse::in_channel(format!(
            "I choose {}!",
            choices[rng.gen_range(0..choices.len())]
        )),
    }
}

/// Rolls every `NdM[+K]` group in `text`.
pub fn dice(text: &str, rng: &mut impl Rng) -> CommandResponse {
    let groups: Vec<_> = DICE_PATTERN.captures_iter(text).collect();
    if groups.is_empty() {
        return CommandResponse::ephemeral(
            "I don't understand your fancy dice. \
             Try sending me things like `1d6 2d4` or `11d12+2`.",
        );
    }

    let mut lines = vec!["You rolled:".to_owned()];
    for group in groups {
        let count = group[1].parse::<u32>().unwrap_or(u32::MAX);
        let sides = group[2].parse::<u32>().unwrap_or(u32::MAX);
        let bonus =
            group.get(3).map_or(0, |bonus| bonus.as_str().parse::<u64>().unwrap_or(u64::MAX));

        if count == 0 || sides == 0 {
            return CommandResponse::ephemeral("I can't roll zero dice!");
        }
        if count > MAX_DICE_PER_GROUP || sides == u32::MAX {
            return CommandResponse::ephemeral("That's more dice than I can hold.");
        }

        let rolls: Vec<u64> = (0..count).map(|_| u64::from(rng.gen_range(1..=sides))).collect();
        let Some(total) = rolls.iter().try_fold(bonus, |sum, roll| sum.checked_add(*roll)) else {
            return CommandResponse::ephemeral("That's more dice than I can hold.");
        };
        let listed = rolls.iter().map(u64::to_string).collect::<Vec<_>>().join(" ");
        let modifier = if bonus > 0 { format!("+{bonus}") } else { String::new() };
        lines.push(format!("{count}d{sides}{modifier}: {listed} = {total}"));
    }
    CommandResponse::in_channel(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use hivebot_slack::CommandResponse;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{choose, dice, roll};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn roll_value(response: &CommandResponse) -> i64 {
        response
            .text
            .trim_start_matches("You rolled a ")
            .trim_end_matches('!')
            .parse()
            .expect("rolled number")
    }

    #[test]
    fn roll_stays_within_bounds() {
        let mut rng = rng();
        for _ in 0..50 {
            let response = roll("", &mut rng);
            assert!(response.is_in_channel());
            assert!((0..=100).contains(&roll_value(&response)));
            assert!((0..=3).contains(&roll_value(&roll("3", &mut rng))));
        }
        assert_eq!(roll_value(&roll("0", &mut rng)), 0);
    }

    #[test]
    fn roll_rejects_non_numbers() {
        let response = roll("lots", &mut rng());
        assert_eq!(response.text, "Sorry 'lots' isn't a valid number.");
        assert!(!response.is_in_channel());
        assert!(roll("-4", &mut rng()).text.starts_with("Sorry"));
    }

    #[test]
    fn choose_handles_zero_one_and_many() {
        let mut rng = rng();
        assert!(!choose(" , ", &mut rng).is_in_channel());
        assert_eq!(choose("tacos", &mut rng).text, "Well I guess I *have* to choose tacos.");

        let picked = choose("tacos, pizza ,ramen", &mut rng).text;
        assert!(
            ["I choose tacos!", "I choose pizza!", "I choose ramen!"].contains(&picked.as_str()),
            "{picked}"
        );
    }

    #[test]
    fn dice_rolls_each_group_with_modifier() {
        let response = dice("1d6 2d4+1 and some words", &mut rng());
        let lines: Vec<&str> = response.text.lines().collect();

        assert!(response.is_in_channel());
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "You rolled:");
        assert!(lines[1].starts_with("1d6: "));
        assert!(lines[2].starts_with("2d4+1: "));

        let (rolls, total) = lines[2].trim_start_matches("2d4+1: ").split_once(" = ").expect("sum");
        let sum: u64 = rolls.split(' ').map(|roll| roll.parse::<u64>().expect("roll")).sum();
        assert_eq!(total.parse::<u64>().expect("total"), sum + 1);
        assert!((3..=9).contains(&(sum + 1)));
    }

    #[test]
    fn dice_rejects_nonsense() {
        assert!(dice("two dice please", &mut rng()).text.starts_with("I don't understand"));
        assert_eq!(dice("0d6", &mut rng()).text, "I can't roll zero dice!");
        assert_eq!(dice("1000d6", &mut rng()).text, "That's more dice than I can hold.");
        let huge_bonus = dice("1d6+18446744073709551615", &mut rng());
        assert_eq!(huge_bonus.text, "That's more dice than I can hold.");
        assert!(!huge_bonus.is_in_channel());
        let unparsable_bonus = dice("1d6+99999999999999999999999", &mut rng());
        assert_eq!(unparsable_bonus.text, "That's more dice than I can hold.");
    }
}
