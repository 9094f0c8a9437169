//! Changing lights and recalling scenes.

use huelink_core::LightUpdate;
use huelink_core::color;

use crate::cli::{GlobalOpts, SceneArgs, SetArgs};
use crate::error::CliError;

use super::util::{self, Target};
use super::Context;

/// Turn the flags into one state change. Validation happens before any
/// connection is made.
pub fn build_update(args: &SetArgs) -> Result<LightUpdate, CliError> {
    let mut update = match (&args.rgb, args.kelvin) {
        (Some(hex), _) => {
            let rgb = color::hex_to_rgb(hex).ok_or_else(|| CliError::Validation {
                field: "rgb".into(),
                reason: format!("'{hex}' is not a #rrggbb color"),
            })?;
            color::rgb_update(rgb)
        }
        (None, Some(kelvin)) => color::temperature_update(kelvin),
        (None, None) => LightUpdate::default(),
    };

    if let Some(brightness) = args.brightness {
        update = update.brightness(f64::from(brightness));
        if brightness > 0 && update.on.is_none() {
            update = update.on(true);
        }
    }
    if args.on {
        update = update.on(true);
    }
    if args.off {
        update = update.on(false);
    }
    if update.is_empty() {
        return Err(CliError::Validation {
            field: "set".into(),
            reason: "nothing to change; pass --on, --off, --brightness, --rgb or --kelvin".into(),
        });
    }
    if let Some(ms) = args.transition {
        update = update.transition_ms(ms);
    }
    Ok(update)
}

pub async fn handle(ctx: &Context, args: &SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let update = build_update(args)?;
    let bridge = ctx.connect().await?;

    let result = match util::resolve_target(&bridge, &args.target)? {
        Target::Light(id) => bridge.set_light(&id, &update).await,
        Target::Group(id) => bridge.set_grouped_light(&id, &update).await,
    };
    bridge.shutdown();
    result?;

    if !global.quiet {
        eprintln!("Updated {}", args.target);
    }
    Ok(())
}

pub async fn recall(ctx: &Context, args: &SceneArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let bridge = ctx.connect().await?;
    let id = util::resolve_scene(&bridge, &args.scene)?;
    let result = bridge.recall_scene(&id).await;
    bridge.shutdown();
    result?;

    if !global.quiet {
        eprintln!("Scene {} activated", args.scene);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args() -> SetArgs {
        SetArgs {
            target: "Desk".into(),
            on: false,
            off: false,
            brightness: None,
            rgb: None,
            kelvin: None,
            transition: None,
        }
    }

    #[test]
    fn brightness_alone_switches_on() {
        let update = build_update(&SetArgs {
            brightness: Some(40),
            ..args()
        })
        .unwrap();
        assert_eq!(update, LightUpdate::default().brightness(40.0).on(true));
    }

    #[test]
    fn explicit_brightness_overrides_color_brightness() {
        let update = build_update(&SetArgs {
            rgb: Some("#ff0000".into()),
            brightness: Some(20),
            ..args()
        })
        .unwrap();
        let dimming = update.dimming.unwrap();
        assert!((dimming.brightness - 20.0).abs() < f64::EPSILON);
        assert!(update.color.is_some());
    }

    #[test]
    fn off_wins_over_color() {
        let update = build_update(&SetArgs {
            kelvin: Some(2700),
            off: true,
            ..args()
        })
        .unwrap();
        assert_eq!(update.on.map(|o| o.on), Some(false));
        assert_eq!(update.color_temperature.map(|c| c.mirek), Some(370));
    }

    #[test]
    fn transition_alone_is_rejected() {
        let err = build_update(&SetArgs {
            transition: Some(400),
            ..args()
        })
        .unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }

    #[test]
    fn bad_hex_is_rejected() {
        let err = build_update(&SetArgs {
            rgb: Some("orange".into()),
            ..args()
        })
        .unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "rgb"));
    }
}
