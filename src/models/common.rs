use std::ops::{Add, AddAssign, Mul, Sub};

/// 水平方向の境界パディング（メートル）
pub const HORIZONTAL_PADDING_M: f64 = 1000.0;
/// 鉛直方向の境界パディング（メートル）
pub const VERTICAL_PADDING_M: f64 = 200.0;

/// 3次元ベクトル（位置・ティックあたり変位の両方に使用）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64, // m
    pub y: f64, // m
    pub z: f64, // m (altitude)
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn from_array(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// ベクトルの長さ
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// XY平面での2次元距離
    pub fn distance_xy(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// 鉛直方向の距離
    pub fn distance_z(&self, other: &Vec3) -> f64 {
        (self.z - other.z).abs()
    }

    /// 3次元距離
    pub fn distance_3d(&self, other: &Vec3) -> f64 {
        (*self - *other).magnitude()
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

/// 呼び出し側が与える空域境界 (W, E, S, N, B, T)、単位はメートル
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AirspaceBounds {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
    pub bottom: f64,
    pub top: f64,
}

impl AirspaceBounds {
    pub fn from_array(b: [f64; 6]) -> Self {
        Self {
            west: b[0],
            east: b[1],
            south: b[2],
            north: b[3],
            bottom: b[4],
            top: b[5],
        }
    }

    pub fn to_array(self) -> [f64; 6] {
        [self.west, self.east, self.south, self.north, self.bottom, self.top]
    }
}

/// 1軸の閉区間 [min, max]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        (self.max - self.min).abs()
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// パディング済みのシミュレーション空間
///
/// 背景交通はこの直方体の内部に存在し、いずれかの軸で外に出たエージェントは
/// 再スポーンの対象になります。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingVolume {
    pub x: Interval,
    pub y: Interval,
    pub z: Interval,
}

impl BoundingVolume {
    /// 空域境界に固定マージン（水平±1000m、鉛直±200m）を加えた空間を作成
    pub fn padded(bounds: &AirspaceBounds) -> Self {
        Self {
            x: Interval::new(bounds.west - HORIZONTAL_PADDING_M, bounds.east + HORIZONTAL_PADDING_M),
            y: Interval::new(bounds.south - HORIZONTAL_PADDING_M, bounds.north + HORIZONTAL_PADDING_M),
            z: Interval::new(bounds.bottom - VERTICAL_PADDING_M, bounds.top + VERTICAL_PADDING_M),
        }
    }

    /// 体積（立方メートル）
    pub fn volume(&self) -> f64 {
        self.x.span() * self.y.span() * self.z.span()
    }

    /// 全軸で内部にあるか
    pub fn contains(&self, p: &Vec3) -> bool {
        self.x.contains(p.x) && self.y.contains(p.y) && self.z.contains(p.z)
    }

    /// いずれかの軸で外に出ているか
    pub fn is_outside(&self, p: &Vec3) -> bool {
        !self.contains(p)
    }
}

/// 数学ユーティリティ関数
pub mod math_utils {
    /// 方位角（北から時計回り、度）を標準角（東から反時計回り、度）に変換
    pub fn bearing_to_angle(bearing_deg: f64) -> f64 {
        (450.0 - bearing_deg).rem_euclid(360.0)
    }

    /// 方位角と速さからXY平面の速度成分を計算
    pub fn bearing_to_velocity_xy(bearing_deg: f64, speed: f64) -> (f64, f64) {
        let angle = bearing_to_angle(bearing_deg).to_radians();
        (speed * angle.cos(), speed * angle.sin())
    }
}

#[cfg(test)]
mod tests {
    use super::math_utils::*;
    use super::*;

    #[test]
    fn test_bearing_to_angle() {
        assert_eq!(bearing_to_angle(0.0), 90.0);
        assert_eq!(bearing_to_angle(90.0), 0.0);
        assert_eq!(bearing_to_angle(180.0), 270.0);
        assert_eq!(bearing_to_angle(270.0), 180.0);
        assert_eq!(bearing_to_angle(360.0), 90.0);
    }

    #[test]
    fn test_bearing_to_velocity_xy() {
        let (vx, vy) = bearing_to_velocity_xy(0.0, 10.0);
        assert!(vx.abs() < 1e-9);
        assert!((vy - 10.0).abs() < 1e-9);

        let (vx, vy) = bearing_to_velocity_xy(90.0, 10.0);
        assert!((vx - 10.0).abs() < 1e-9);
        assert!(vy.abs() < 1e-9);
    }

    #[test]
    fn test_padded_volume() {
        let bounds = AirspaceBounds::from_array([0.0, 10000.0, 0.0, 10000.0, 0.0, 1524.0]);
        let volume = BoundingVolume::padded(&bounds);

        assert_eq!(volume.x, Interval::new(-1000.0, 11000.0));
        assert_eq!(volume.y, Interval::new(-1000.0, 11000.0));
        assert_eq!(volume.z, Interval::new(-200.0, 1724.0));
        assert_eq!(volume.volume(), 12000.0 * 12000.0 * 1924.0);
    }

    #[test]
    fn test_outside_on_any_axis() {
        let bounds = AirspaceBounds::from_array([0.0, 100.0, 0.0, 100.0, 0.0, 100.0]);
        let volume = BoundingVolume::padded(&bounds);

        assert!(!volume.is_outside(&Vec3::new(50.0, 50.0, 50.0)));
        assert!(!volume.is_outside(&Vec3::new(-1000.0, 1100.0, 300.0)));
        assert!(volume.is_outside(&Vec3::new(1101.0, 50.0, 50.0)));
        assert!(volume.is_outside(&Vec3::new(50.0, -1001.0, 50.0)));
        assert!(volume.is_outside(&Vec3::new(50.0, 50.0, 301.0)));
    }

    #[test]
    fn test_vec3_distances() {
        let a = Vec3::new(0.0, 0.0, 10.0);
        let b = Vec3::new(3.0, 4.0, -2.0);
        assert_eq!(a.distance_xy(&b), 5.0);
        assert_eq!(a.distance_z(&b), 12.0);
        assert_eq!(a.distance_3d(&b), 13.0);
    }
}
