//! Named starting layouts for [`SimRobot`].
//!
//! | Scene | Layout |
//! |---|---|
//! | `empty` | No blocks; a face in front of the robot. |
//! | `two_blocks` | Two upright blocks side by side and a face. |
//! | `tipped` | One upright block, one on its side and one upside down. |

use std::fmt;
use std::str::FromStr;

use botcore_types::{ObjectId, ObjectOrientation, Pose};

use crate::SimError;
use crate::sim::{SimConfig, SimRobot, SimRobotBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scene {
    Empty,
    #[default]
    TwoBlocks,
    Tipped,
}

impl Scene {
    pub const ALL: [Scene; 3] = [Scene::Empty, Scene::TwoBlocks, Scene::Tipped];

    pub fn as_str(self) -> &'static str {
        match self {
            Scene::Empty => "empty",
            Scene::TwoBlocks => "two_blocks",
            Scene::Tipped => "tipped",
        }
    }

    /// A builder pre-populated with this scene.
    pub fn builder(self) -> SimRobotBuilder {
        let face = Pose::new(400.0, 50.0, std::f32::consts::PI);
        let base = SimRobot::builder().with_face(face);
        match self {
            Scene::Empty => base,
            Scene::TwoBlocks => base
                .with_block(ObjectId(1), Pose::new(250.0, 0.0, 0.0), ObjectOrientation::Upright)
                .with_block(ObjectId(2), Pose::new(250.0, 150.0, 0.0), ObjectOrientation::Upright),
            Scene::Tipped => base
                .with_block(ObjectId(1), Pose::new(250.0, 0.0, 0.0), ObjectOrientation::Upright)
                .with_block(ObjectId(2), Pose::new(250.0, 150.0, 0.0), ObjectOrientation::OnSide)
                .with_block(
                    ObjectId(3),
                    Pose::new(-200.0, 120.0, 0.0),
                    ObjectOrientation::UpsideDown,
                ),
        }
    }

    pub fn build(self, config: SimConfig) -> SimRobot {
        self.builder().with_config(config).build()
    }
}

impl fmt::Display for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scene {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scene::ALL
            .into_iter()
            .find(|scene| scene.as_str() == s)
            .ok_or_else(|| SimError::UnknownScene(s.to_string()))
    }
}
